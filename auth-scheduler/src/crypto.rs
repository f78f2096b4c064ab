// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use aes::Aes128;
use ccm::aead::generic_array::GenericArray;
use ccm::aead::{AeadInPlace, KeyInit};
use ccm::consts::{U12, U4};
use ccm::Ccm;
use crc::{Crc, CRC_32_ISO_HDLC};
use hkdf::Hkdf;
use sha2::{Digest, Sha256};

type AesCcm = Ccm<Aes128, U4, U12>;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Authentication of a CCM ciphertext failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CryptoError;

/// Primitives the handshake is built on.
pub trait Crypto {
    fn sha256(&self, data: &[u8]) -> [u8; 32];

    /// HKDF-SHA256 extract and expand into `okm`.
    fn hkdf(&self, ikm: &[u8], salt: &[u8], info: &[u8], okm: &mut [u8]);

    /// AES-128-CCM with a 12-byte nonce. Encrypts `buf` in place and returns the 4-byte MIC.
    fn ccm_encrypt(&self, key: &[u8; 16], nonce: &[u8; 12], aad: &[u8], buf: &mut [u8]) -> [u8; 4];

    /// Verifies `mic` and decrypts `buf` in place. `buf` is left untouched on failure.
    fn ccm_decrypt(
        &self,
        key: &[u8; 16],
        nonce: &[u8; 12],
        aad: &[u8],
        buf: &mut [u8],
        mic: &[u8; 4],
    ) -> Result<(), CryptoError>;

    /// CRC-32 as used by zlib.
    fn crc32(&self, data: &[u8]) -> u32;
}

/// Software implementation on top of the RustCrypto crates.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftCrypto;

impl Crypto for SoftCrypto {
    fn sha256(&self, data: &[u8]) -> [u8; 32] {
        Sha256::digest(data).into()
    }

    fn hkdf(&self, ikm: &[u8], salt: &[u8], info: &[u8], okm: &mut [u8]) {
        Hkdf::<Sha256>::new(Some(salt), ikm)
            .expand(info, okm)
            .expect("okm shorter than 255 hash blocks");
    }

    fn ccm_encrypt(&self, key: &[u8; 16], nonce: &[u8; 12], aad: &[u8], buf: &mut [u8]) -> [u8; 4] {
        let cipher = AesCcm::new(GenericArray::from_slice(key));
        let tag = cipher
            .encrypt_in_place_detached(GenericArray::from_slice(nonce), aad, buf)
            .expect("handshake buffers are far below the CCM length limit");
        let mut mic = [0; 4];
        mic.copy_from_slice(&tag);
        mic
    }

    fn ccm_decrypt(
        &self,
        key: &[u8; 16],
        nonce: &[u8; 12],
        aad: &[u8],
        buf: &mut [u8],
        mic: &[u8; 4],
    ) -> Result<(), CryptoError> {
        let cipher = AesCcm::new(GenericArray::from_slice(key));
        cipher
            .decrypt_in_place_detached(
                GenericArray::from_slice(nonce),
                aad,
                buf,
                GenericArray::from_slice(mic),
            )
            .map_err(|_| CryptoError)
    }

    fn crc32(&self, data: &[u8]) -> u32 {
        CRC32.checksum(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32_matches_zlib() {
        assert_eq!(SoftCrypto.crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn sha256_known_answer() {
        let digest = SoftCrypto.sha256(b"abc");
        assert_eq!(&digest[..4], &[0xBA, 0x78, 0x16, 0xBF]);
    }

    #[test]
    fn ccm_round_trip_and_tamper() {
        let key = [0x42; 16];
        let nonce = consts::CCM_NONCE;
        let plain = *b"capability key!!";

        let mut buf = plain;
        let mic = SoftCrypto.ccm_encrypt(&key, &nonce, b"aad", &mut buf);
        assert_ne!(buf, plain);

        let mut opened = buf;
        SoftCrypto
            .ccm_decrypt(&key, &nonce, b"aad", &mut opened, &mic)
            .unwrap();
        assert_eq!(opened, plain);

        let mut wrong_aad = buf;
        assert_eq!(
            SoftCrypto.ccm_decrypt(&key, &nonce, b"aae", &mut wrong_aad, &mic),
            Err(CryptoError)
        );

        let mut flipped = buf;
        flipped[3] ^= 1;
        assert_eq!(
            SoftCrypto.ccm_decrypt(&key, &nonce, b"aad", &mut flipped, &mic),
            Err(CryptoError)
        );
    }
}
