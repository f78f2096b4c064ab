// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::VecDeque;

use auth_scheduler::PairCodeInput;
use consts::PAIR_CODE_LEN;

/// Keys left over from before the prompt. The device must discard them.
const STALE_KEYS: &[u8] = b"#*";

/// Keys typed per poll once the code is being entered.
const KEYS_PER_POLL: usize = 2;

/// Keypad on which the user types the pairing code shown by the phone.
#[derive(Debug, Clone)]
pub struct Keypad {
    code: [u8; PAIR_CODE_LEN],
    /// Input available at each poll, front first.
    polls: VecDeque<Vec<u8>>,
}

impl Keypad {
    pub fn new(code: [u8; PAIR_CODE_LEN]) -> Self {
        Self {
            code,
            polls: VecDeque::new(),
        }
    }

    pub fn code(&self) -> &[u8; PAIR_CODE_LEN] {
        &self.code
    }

    /// Queues a stale key press, an idle poll, then the code a few keys at a time.
    pub fn arm(&mut self) {
        self.polls.clear();
        self.polls.push_back(STALE_KEYS.to_vec());
        self.polls.push_back(Vec::new());
        self.polls
            .extend(self.code.chunks(KEYS_PER_POLL).map(<[u8]>::to_vec));
    }

    pub fn is_drained(&self) -> bool {
        self.polls.is_empty()
    }
}

impl PairCodeInput for Keypad {
    fn poll_input(&mut self, buf: &mut [u8]) -> usize {
        let Some(mut keys) = self.polls.pop_front() else {
            return 0;
        };
        let len = keys.len().min(buf.len());
        buf[..len].copy_from_slice(&keys[..len]);
        if len < keys.len() {
            self.polls.push_front(keys.split_off(len));
        }
        len
    }
}
