// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Cooperative threads.
//!
//! A thread is a state machine that runs from its current state until it
//! reaches a condition that does not hold yet, then returns
//! [`Step::Blocked`] and resumes from the same state on the next call. Waiting
//! on a child thread is just stepping it and returning `Blocked` until it
//! reports [`Step::Done`].

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Step {
    Blocked,
    Done,
}

pub trait Thread<Cx> {
    /// Runs until the thread blocks or finishes.
    fn step(&mut self, cx: &mut Cx) -> Step;
}

/// A thread slot of the active procedure.
///
/// The thread is stepped once per tick while it is blocked and never again
/// once it has finished.
#[derive(Debug)]
pub struct Scheduled<T> {
    thread: T,
    last: Step,
}

impl<T> Scheduled<T> {
    pub fn new(thread: T) -> Self {
        Self {
            thread,
            last: Step::Blocked,
        }
    }

    pub fn schedule<Cx>(&mut self, cx: &mut Cx)
    where
        T: Thread<Cx>,
    {
        if self.last == Step::Blocked {
            self.last = self.thread.step(cx);
        }
    }

    pub fn is_done(&self) -> bool {
        self.last == Step::Done
    }

    /// Puts a fresh thread in the slot.
    pub fn restart(&mut self, thread: T) {
        self.thread = thread;
        self.last = Step::Blocked;
    }

    pub fn thread(&self) -> &T {
        &self.thread
    }
}
