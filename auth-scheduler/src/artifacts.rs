// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use consts::{CCM_MIC_LEN, MAX_CERT_LEN, PROTOCOL_VERSION};
use heapless::Vec;

pub(crate) const PUBKEY_LEN: usize = 64;
pub(crate) const MSC_INFO_LEN: usize = 12;
pub(crate) const DEVICE_ID_LEN: usize = 8;
pub(crate) const SIGNATURE_LEN: usize = 64;
pub(crate) const LOGIN_BLOB_LEN: usize = 4 + CCM_MIC_LEN;
pub(crate) const SHARE_INFO_LEN: usize = 32;
pub(crate) const SHARE_BLOB_LEN: usize = SHARE_INFO_LEN + CCM_MIC_LEN;

/// Buffer a transfer reads from or writes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Region {
    /// Peer public key.
    AppPub,
    /// Device info record followed by the device public key.
    InfoPub,
    DevPub,
    DevCert,
    ManuCert,
    DevSign,
    LoginBlob,
    ShareBlob,
}

/// Certificate sizes reported by the element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct CertLengths {
    pub(crate) device: u16,
    pub(crate) manufacturer: u16,
    pub(crate) root: u16,
}

impl CertLengths {
    pub(crate) fn parse(bytes: &[u8]) -> Self {
        let word = |at: usize| {
            bytes
                .get(at..at + 2)
                .map(|b| u16::from_be_bytes([b[0], b[1]]))
                .unwrap_or(0)
        };
        Self {
            device: word(0),
            manufacturer: word(2),
            root: word(4),
        }
    }
}

/// Byte artifacts produced and consumed during one procedure run.
pub(crate) struct Artifacts {
    pub(crate) app_pub: [u8; PUBKEY_LEN],
    /// `msc_info` then `dev_pub`, kept together because registration sends them as one artifact.
    pub(crate) info_pub: [u8; MSC_INFO_LEN + PUBKEY_LEN],
    pub(crate) eph_key: [u8; 32],
    pub(crate) dev_sha: [u8; 32],
    pub(crate) dev_sign: [u8; SIGNATURE_LEN],
    pub(crate) cert_lengths: CertLengths,
    pub(crate) dev_cert: Vec<u8, MAX_CERT_LEN>,
    pub(crate) manu_cert: Vec<u8, MAX_CERT_LEN>,
    pub(crate) login_blob: [u8; LOGIN_BLOB_LEN],
    pub(crate) share_blob: [u8; SHARE_BLOB_LEN],
}

impl Artifacts {
    pub(crate) const fn new() -> Self {
        Self {
            app_pub: [0; PUBKEY_LEN],
            info_pub: [0; MSC_INFO_LEN + PUBKEY_LEN],
            eph_key: [0; 32],
            dev_sha: [0; 32],
            dev_sign: [0; SIGNATURE_LEN],
            cert_lengths: CertLengths {
                device: 0,
                manufacturer: 0,
                root: 0,
            },
            dev_cert: Vec::new(),
            manu_cert: Vec::new(),
            login_blob: [0; LOGIN_BLOB_LEN],
            share_blob: [0; SHARE_BLOB_LEN],
        }
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::new();
    }

    pub(crate) fn get(&self, region: Region) -> &[u8] {
        match region {
            Region::AppPub => &self.app_pub,
            Region::InfoPub => &self.info_pub,
            Region::DevPub => &self.info_pub[MSC_INFO_LEN..],
            Region::DevCert => &self.dev_cert,
            Region::ManuCert => &self.manu_cert,
            Region::DevSign => &self.dev_sign,
            Region::LoginBlob => &self.login_blob,
            Region::ShareBlob => &self.share_blob,
        }
    }

    pub(crate) fn get_mut(&mut self, region: Region) -> &mut [u8] {
        match region {
            Region::AppPub => &mut self.app_pub,
            Region::InfoPub => &mut self.info_pub,
            Region::DevPub => &mut self.info_pub[MSC_INFO_LEN..],
            Region::DevCert => &mut self.dev_cert,
            Region::ManuCert => &mut self.manu_cert,
            Region::DevSign => &mut self.dev_sign,
            Region::LoginBlob => &mut self.login_blob,
            Region::ShareBlob => &mut self.share_blob,
        }
    }

    pub(crate) fn dev_pub(&self) -> &[u8] {
        self.get(Region::DevPub)
    }

    pub(crate) fn device_id(&self) -> [u8; DEVICE_ID_LEN] {
        let mut id = [0; DEVICE_ID_LEN];
        id.copy_from_slice(&self.info_pub[..DEVICE_ID_LEN]);
        id
    }

    /// Condenses the element's info response into the record sent to the peer.
    ///
    /// Only the info format marker, the element software version and the
    /// protocol version are kept; the rest of the device id stays zero.
    ///
    /// The response is packed: a 4-byte header, then the software version at
    /// bytes 4..6.
    pub(crate) fn set_msc_info(&mut self, response: &[u8]) {
        let info = &mut self.info_pub[..MSC_INFO_LEN];
        info.fill(0);
        info[0] = 1;
        if let Some(sw_ver) = response.get(4..6) {
            info[8..10].copy_from_slice(sw_ver);
        }
        info[10..12].copy_from_slice(&PROTOCOL_VERSION.to_le_bytes());
    }
}
