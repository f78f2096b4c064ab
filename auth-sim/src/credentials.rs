// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Blobs the phone app and the cloud build for the device.

use auth_scheduler::keys::{self, LTMK_LEN};
use auth_scheduler::{Crypto, SoftCrypto};
use consts::{CAPABILITY_AAD_FLAG, CCM_NONCE};

/// What the phone keeps after registering a device.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Credentials {
    pub device_id: [u8; 8],
    pub ltmk: [u8; LTMK_LEN],
}

impl core::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Credentials")
            .field("device_id", &self.device_id)
            .finish_non_exhaustive()
    }
}

/// Encrypts `plain` under `key` with the fixed handshake nonce and appends the MIC.
fn seal(key: &[u8; 16], plain: &[u8]) -> Vec<u8> {
    let mut blob = plain.to_vec();
    let mic = SoftCrypto.ccm_encrypt(key, &CCM_NONCE, &[], &mut blob);
    blob.extend_from_slice(&mic);
    blob
}

/// Owner login proof: the CRC-32 of the device public key under the login app key.
pub fn login_blob(eph_key: &[u8; 32], ltmk: &[u8; LTMK_LEN], dev_pub: &[u8]) -> Vec<u8> {
    let session = keys::derive_login_keys(&SoftCrypto, eph_key, ltmk);
    seal(&session.app_key, &SoftCrypto.crc32(dev_pub).to_le_bytes())
}

/// Capability key issued by the cloud: nonce, sealed key and MIC.
///
/// The key id rides in the last four nonce bytes. The key itself starts with
/// its expiry time.
pub fn capability(credentials: &Credentials, key_id: u32, expire_time: u32) -> [u8; 32] {
    let cloud = keys::derive_cloud_keys(&SoftCrypto, &credentials.ltmk);

    let mut nonce = [0; 12];
    nonce[..8].copy_from_slice(&SoftCrypto.sha256(&expire_time.to_le_bytes())[..8]);
    nonce[8..].copy_from_slice(&key_id.to_le_bytes());

    let mut key = [0x5A; 16];
    key[..4].copy_from_slice(&expire_time.to_le_bytes());

    let mut aad = [0; 9];
    aad[..8].copy_from_slice(&credentials.device_id);
    aad[8] = CAPABILITY_AAD_FLAG;
    let mic = SoftCrypto.ccm_encrypt(&cloud.dev_key, &nonce, &aad, &mut key);

    let mut out = [0; 32];
    out[..12].copy_from_slice(&nonce);
    out[12..28].copy_from_slice(&key);
    out[28..].copy_from_slice(&mic);
    out
}

/// Shared login blob: a capability under the share session app key.
pub fn share_blob(eph_key: &[u8; 32], capability: &[u8; 32]) -> Vec<u8> {
    let session = keys::derive_share_keys(&SoftCrypto, eph_key);
    seal(&session.app_key, capability)
}

#[cfg(test)]
mod tests {
    use super::*;
    use auth_scheduler::KeyRecord;

    const CREDENTIALS: Credentials = Credentials {
        device_id: [1, 0, 0, 0, 0, 0, 0, 0],
        ltmk: [0x3C; 32],
    };

    #[test]
    fn device_accepts_login_blob() {
        let eph = [0x21; 32];
        let dev_pub = [0x77; 64];
        let blob = login_blob(&eph, &CREDENTIALS.ltmk, &dev_pub);
        assert_eq!(blob.len(), 8);

        let session = keys::derive_login_keys(&SoftCrypto, &eph, &CREDENTIALS.ltmk);
        assert!(keys::verify_login(&SoftCrypto, &session, &blob, &dev_pub));
        assert!(!keys::verify_login(&SoftCrypto, &session, &blob, &[0x78; 64]));
    }

    #[test]
    fn device_accepts_capability() {
        let cloud = keys::derive_cloud_keys(&SoftCrypto, &CREDENTIALS.ltmk);
        let record = KeyRecord::new(CREDENTIALS.device_id, &cloud, [0; 16]);
        let now = 1_700_000_000;

        let info = capability(&CREDENTIALS, 42, now + 3_600);
        assert_eq!(keys::verify_capability(&SoftCrypto, &record, &info, now), Ok(42));

        let other = KeyRecord::new([2; 8], &cloud, [0; 16]);
        assert!(keys::verify_capability(&SoftCrypto, &other, &info, now).is_err());
    }
}
