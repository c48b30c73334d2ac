/*
 * Copyright (C) 2025 Jakub Žitník
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 */

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Cookie carrying the signed session identifier.
pub const SESSION_COOKIE: &str = "px_session_id";
/// Session cookie lifetime: 30 days.
pub const SESSION_MAX_AGE_SECS: u64 = 2_592_000;

/// Mints and verifies signed session identifiers.
///
/// The wire form is `<sid>.<base64url(HMAC-SHA256(secret, sid))>`. Rotating
/// the secret invalidates every outstanding session.
pub struct SessionCodec {
    secret: Vec<u8>,
}

impl SessionCodec {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    /// Random 128-bit identifier, lowercase hex.
    pub fn generate_sid(&self) -> String {
        let mut bytes = [0u8; 16];
        OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    pub fn sign(&self, sid: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(sid.as_bytes());
        let tag = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        format!("{sid}.{tag}")
    }

    /// Returns the raw sid when the signature checks out. The MAC
    /// comparison is constant-time.
    pub fn verify(&self, signed: &str) -> Option<String> {
        let (sid, tag) = signed.rsplit_once('.')?;
        if sid.is_empty() {
            return None;
        }
        let tag_bytes = URL_SAFE_NO_PAD.decode(tag).ok()?;
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(sid.as_bytes());
        mac.verify_slice(&tag_bytes).ok()?;
        Some(sid.to_string())
    }
}
