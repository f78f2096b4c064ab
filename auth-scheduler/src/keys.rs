// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Key derivation and persisted key material.
//!
//! Every derivation is HKDF-SHA256 over a fixed salt and info pair, so the
//! peer can reproduce each key from the same inputs.

use consts::{
    CAPABILITY_AAD_FLAG, CCM_MIC_LEN, CCM_NONCE, CLOUD_INFO, CLOUD_SALT, KEY_RECORD_ID, LOGIN_INFO,
    LOGIN_SALT, PAIR_CODE_LEN, RTC_DRIFT_SECS, SETUP_INFO, SHARE_INFO, SHARE_SALT,
};
use serde::{Deserialize, Serialize};

use crate::artifacts::{DEVICE_ID_LEN, SHARE_INFO_LEN};
use crate::{Crypto, CryptoError, Error, RecordStore, StorageError};

pub const LTMK_LEN: usize = 32;

/// Element slot holding the long-term key wrapped with the record's wrap key.
pub const MKPK_SLOT_WRAPPED: u8 = 0;
/// Element slot holding the long-term key in the clear.
pub const MKPK_SLOT_PLAIN: u8 = 1;
/// Largest master key packet: slot, ciphertext and MIC.
pub const MKPK_MAX_LEN: usize = 1 + LTMK_LEN + CCM_MIC_LEN;

/// Whether this build wraps the long-term key before handing it to the element.
pub const WRAPS_LTMK: bool = cfg!(feature = "wrap-ltmk");

/// Direction keys and IVs split out of a 64-byte HKDF output.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionKeys {
    pub dev_key: [u8; 16],
    pub app_key: [u8; 16],
    pub dev_iv: [u8; 4],
    pub app_iv: [u8; 4],
}

impl SessionKeys {
    pub const OKM_LEN: usize = 64;

    fn derive<C: Crypto>(crypto: &C, ikm: &[u8], salt: &[u8], info: &[u8]) -> Self {
        let mut okm = [0; Self::OKM_LEN];
        crypto.hkdf(ikm, salt, info, &mut okm);

        let mut keys = Self::default();
        keys.dev_key.copy_from_slice(&okm[..16]);
        keys.app_key.copy_from_slice(&okm[16..32]);
        keys.dev_iv.copy_from_slice(&okm[32..36]);
        keys.app_iv.copy_from_slice(&okm[36..40]);
        keys
    }
}

impl core::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("SessionKeys { .. }")
    }
}

/// Who the current session belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Authorization {
    #[default]
    None,
    Owner,
    Share,
}

/// Long-term key from the registration ECDH secret and the pairing code.
pub fn derive_long_term_key<C: Crypto>(
    crypto: &C,
    eph_key: &[u8; 32],
    pair_code: &[u8; PAIR_CODE_LEN],
) -> [u8; LTMK_LEN] {
    let mut ltmk = [0; LTMK_LEN];
    crypto.hkdf(eph_key, pair_code, SETUP_INFO, &mut ltmk);
    ltmk
}

/// Owner session keys. Both the fresh ECDH secret and the long-term key feed the derivation.
pub fn derive_login_keys<C: Crypto>(
    crypto: &C,
    eph_key: &[u8; 32],
    ltmk: &[u8; LTMK_LEN],
) -> SessionKeys {
    let mut ikm = [0; 32 + LTMK_LEN];
    ikm[..32].copy_from_slice(eph_key);
    ikm[32..].copy_from_slice(ltmk);
    SessionKeys::derive(crypto, &ikm, LOGIN_SALT, LOGIN_INFO)
}

pub fn derive_share_keys<C: Crypto>(crypto: &C, eph_key: &[u8; 32]) -> SessionKeys {
    SessionKeys::derive(crypto, eph_key, SHARE_SALT, SHARE_INFO)
}

/// Beacon key (app half) and cloud key (device half) of a registered device.
pub fn derive_cloud_keys<C: Crypto>(crypto: &C, ltmk: &[u8; LTMK_LEN]) -> SessionKeys {
    SessionKeys::derive(crypto, ltmk, CLOUD_SALT, CLOUD_INFO)
}

/// Builds the element's master key packet into `out` and returns its length.
pub fn seal_master_key<C: Crypto>(
    crypto: &C,
    ltmk: &[u8; LTMK_LEN],
    wrap_key: Option<&[u8; 16]>,
    out: &mut [u8; MKPK_MAX_LEN],
) -> usize {
    out[1..1 + LTMK_LEN].copy_from_slice(ltmk);
    match wrap_key {
        Some(key) => {
            out[0] = MKPK_SLOT_WRAPPED;
            let mic = crypto.ccm_encrypt(key, &CCM_NONCE, &[], &mut out[1..1 + LTMK_LEN]);
            out[1 + LTMK_LEN..].copy_from_slice(&mic);
            MKPK_MAX_LEN
        }
        None => {
            out[0] = MKPK_SLOT_PLAIN;
            1 + LTMK_LEN
        }
    }
}

/// Size of the element's answer to a master key read.
pub fn master_key_response_len(wrapped: bool) -> usize {
    if wrapped {
        LTMK_LEN + CCM_MIC_LEN
    } else {
        LTMK_LEN
    }
}

/// Recovers the long-term key from the element's master key read.
pub fn open_master_key<C: Crypto>(
    crypto: &C,
    response: &[u8],
    wrap_key: Option<&[u8; 16]>,
) -> Result<[u8; LTMK_LEN], CryptoError> {
    let mut ltmk = [0; LTMK_LEN];
    let cipher = response.get(..LTMK_LEN).ok_or(CryptoError)?;
    ltmk.copy_from_slice(cipher);
    if let Some(key) = wrap_key {
        let mut mic = [0; CCM_MIC_LEN];
        mic.copy_from_slice(response.get(LTMK_LEN..LTMK_LEN + CCM_MIC_LEN).ok_or(CryptoError)?);
        crypto.ccm_decrypt(key, &CCM_NONCE, &[], &mut ltmk, &mic)?;
    }
    Ok(ltmk)
}

/// Opens a handshake blob laid out as ciphertext followed by a 4-byte MIC.
pub(crate) fn open_blob<C: Crypto>(
    crypto: &C,
    key: &[u8; 16],
    blob: &[u8],
    plain: &mut [u8],
) -> Result<(), CryptoError> {
    let split = blob.len().checked_sub(CCM_MIC_LEN).ok_or(CryptoError)?;
    if plain.len() != split {
        return Err(CryptoError);
    }
    let mut mic = [0; CCM_MIC_LEN];
    mic.copy_from_slice(&blob[split..]);
    plain.copy_from_slice(&blob[..split]);
    crypto.ccm_decrypt(key, &CCM_NONCE, &[], plain, &mic)
}

/// Checks an owner login blob: the CRC-32 of the device public key sealed
/// under the session app key.
pub fn verify_login<C: Crypto>(
    crypto: &C,
    session: &SessionKeys,
    blob: &[u8],
    dev_pub: &[u8],
) -> bool {
    let mut crc = [0; 4];
    if open_blob(crypto, &session.app_key, blob, &mut crc).is_err() {
        return false;
    }
    u32::from_le_bytes(crc) == crypto.crc32(dev_pub)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CapabilityError {
    /// Share blob did not authenticate under the session key.
    Envelope,
    /// Capability key did not authenticate under the cloud key.
    KeyAuthentication,
    /// Capability key expires within the allowed clock drift.
    Expired { expire_time: u32, now: u32 },
}

impl core::fmt::Display for CapabilityError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Envelope => write!(f, "share info failed authentication"),
            Self::KeyAuthentication => write!(f, "capability key failed authentication"),
            Self::Expired { expire_time, now } => {
                write!(f, "capability key expired at {expire_time}, now {now}")
            }
        }
    }
}

/// Validates a shared-login capability and returns its key id.
///
/// `share_info` is the opened share blob: nonce (12 bytes), capability key
/// ciphertext (16 bytes) and its MIC (4 bytes). The key opens under the cloud
/// key with `device_id ‖ 0x01` as associated data and must stay valid for more
/// than the allowed clock drift.
pub fn verify_capability<C: Crypto>(
    crypto: &C,
    record: &KeyRecord,
    share_info: &[u8; SHARE_INFO_LEN],
    now: u32,
) -> Result<u32, CapabilityError> {
    let mut nonce = [0; 12];
    nonce.copy_from_slice(&share_info[..12]);
    let mut key = [0; 16];
    key.copy_from_slice(&share_info[12..28]);
    let mut mic = [0; CCM_MIC_LEN];
    mic.copy_from_slice(&share_info[28..32]);

    let mut aad = [0; DEVICE_ID_LEN + 1];
    aad[..DEVICE_ID_LEN].copy_from_slice(&record.device_id);
    aad[DEVICE_ID_LEN] = CAPABILITY_AAD_FLAG;

    crypto
        .ccm_decrypt(&record.cloud_key, &nonce, &aad, &mut key, &mic)
        .map_err(|_| CapabilityError::KeyAuthentication)?;

    let expire_time = u32::from_le_bytes([key[0], key[1], key[2], key[3]]);
    if expire_time <= now.saturating_add(RTC_DRIFT_SECS) {
        return Err(CapabilityError::Expired { expire_time, now });
    }
    Ok(u32::from_le_bytes([nonce[8], nonce[9], nonce[10], nonce[11]]))
}

/// Key material persisted after a successful registration.
#[derive(Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub device_id: [u8; DEVICE_ID_LEN],
    pub beacon_key: [u8; 16],
    pub cloud_key: [u8; 16],
    #[cfg(feature = "wrap-ltmk")]
    pub wrap_key: [u8; 16],
}

impl KeyRecord {
    #[cfg(not(feature = "wrap-ltmk"))]
    pub const SIZE: usize = DEVICE_ID_LEN + 16 + 16;
    #[cfg(feature = "wrap-ltmk")]
    pub const SIZE: usize = DEVICE_ID_LEN + 16 + 16 + 16;

    pub fn new(
        device_id: [u8; DEVICE_ID_LEN],
        cloud: &SessionKeys,
        #[allow(unused_variables)] wrap_key: [u8; 16],
    ) -> Self {
        Self {
            device_id,
            beacon_key: cloud.app_key,
            cloud_key: cloud.dev_key,
            #[cfg(feature = "wrap-ltmk")]
            wrap_key,
        }
    }

    /// Key the long-term key is wrapped with at the element, when wrapping is enabled.
    pub fn wrap_key(&self) -> Option<&[u8; 16]> {
        #[cfg(feature = "wrap-ltmk")]
        return Some(&self.wrap_key);
        #[cfg(not(feature = "wrap-ltmk"))]
        None
    }

    pub fn to_bytes<'a>(&self, buf: &'a mut [u8; Self::SIZE]) -> Result<&'a mut [u8], Error> {
        postcard::to_slice(self, buf).map_err(|_| Error::Record)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        postcard::from_bytes(bytes).map_err(|_| Error::Record)
    }

    pub fn load<S: RecordStore>(store: &mut S) -> Result<Self, StorageError> {
        let mut buf = [0; Self::SIZE];
        let len = store.read_record(KEY_RECORD_ID, &mut buf)?;
        Self::from_bytes(&buf[..len.min(Self::SIZE)]).map_err(|_| StorageError::Io)
    }

    pub fn store<S: RecordStore>(&self, store: &mut S) -> Result<(), StorageError> {
        let mut buf = [0; Self::SIZE];
        let bytes = self.to_bytes(&mut buf).map_err(|_| StorageError::Io)?;
        store.write_record(KEY_RECORD_ID, bytes)
    }
}

impl core::fmt::Debug for KeyRecord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("KeyRecord")
            .field("device_id", &self.device_id)
            .finish_non_exhaustive()
    }
}
