// BBASIC: an interpreter for a subset of BBC BASIC II.
//
// This program is free software: you can redistribute it and/or
// modify it under the terms of the GNU Lesser General Public License
// as published by the Free Software Foundation, either version 3 of
// the License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public
// License along with this program.  If not, see
// <https://www.gnu.org/licenses/>.

//! `SIGINT` handling: restores the terminal to cooked mode and flips a
//! shared interrupt flag, polled by the dispatcher between statements.

use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use std::sync::Arc;

use libc::c_int;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

use crate::terminal;

// The handler is a plain `extern "C" fn`, so it can't close over the
// flag it sets; this holds the one instance installed for the process.
static TARGET: AtomicPtr<AtomicBool> = AtomicPtr::new(ptr::null_mut());

extern "C" fn handle_sigint(_sig: c_int) {
    terminal::tty_reset();
    let flag = TARGET.load(Ordering::SeqCst);
    if !flag.is_null() {
        unsafe { (*flag).store(true, Ordering::SeqCst) };
    }
}

/// Installs the `SIGINT` handler once and returns the flag it sets. The
/// pointer stashed in `TARGET` is never reclaimed via `Arc::from_raw` --
/// it outlives the handler for the life of the process, which for a
/// short-lived CLI is the whole point.
pub fn install() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let raw = Arc::into_raw(flag.clone()) as *mut AtomicBool;
    TARGET.store(raw, Ordering::SeqCst);

    let action = SigAction::new(SigHandler::Handler(handle_sigint), SaFlags::empty(), SigSet::empty());
    unsafe {
        sigaction(Signal::SIGINT, &action).expect("failed to install SIGINT handler");
    }
    flag
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn installed_flag_starts_clear() {
        let flag = install();
        assert!(!flag.load(Ordering::SeqCst));
    }
}
