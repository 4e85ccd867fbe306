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

//! `GET`/`INKEY` single-character terminal reads in cbreak mode.

use std::io::Read;
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use nix::sys::select::{select, FdSet};
use nix::sys::termios::{self, LocalFlags, SetArg, Termios};

use crate::error::BasicError;

static CBREAK_ACTIVE: AtomicBool = AtomicBool::new(false);
static SAVED: Mutex<Option<Termios>> = Mutex::new(None);

pub enum ReadOutcome {
    Byte(u8),
    Timeout,
    Eof,
}

/// Enters cbreak mode (disables `ECHO|ICANON`, `VMIN=1`, `VTIME=0`),
/// remembering the prior mode so `tty_reset` can restore it.
fn enter_cbreak() -> nix::Result<()> {
    let fd = std::io::stdin().as_raw_fd();
    let original = termios::tcgetattr(fd)?;
    let mut raw = original.clone();
    raw.local_flags.remove(LocalFlags::ECHO | LocalFlags::ICANON);
    raw.control_chars[nix::sys::termios::SpecialCharacterIndices::VMIN as usize] = 1;
    raw.control_chars[nix::sys::termios::SpecialCharacterIndices::VTIME as usize] = 0;
    termios::tcsetattr(fd, SetArg::TCSANOW, &raw)?;
    *SAVED.lock().unwrap() = Some(original);
    CBREAK_ACTIVE.store(true, Ordering::SeqCst);
    Ok(())
}

/// Restores cooked mode if cbreak was ever entered. Safe to call from a
/// signal handler context or at normal process exit; idempotent.
pub fn tty_reset() {
    if !CBREAK_ACTIVE.swap(false, Ordering::SeqCst) {
        return;
    }
    if let Some(original) = SAVED.lock().unwrap().take() {
        let fd = std::io::stdin().as_raw_fd();
        let _ = termios::tcsetattr(fd, SetArg::TCSANOW, &original);
    }
}

/// Blocks for one character in cbreak mode, with an optional timeout in
/// 1/100-second units (`INKEY(n)` waits `n * 10` ms). `EINTR` during the
/// read (the `SIGINT` handler firing) surfaces as `Escape`.
pub fn get_char(timeout_cs: Option<i32>) -> Result<ReadOutcome, BasicError> {
    if enter_cbreak().is_err() {
        // Not a real terminal (e.g. piped stdin in tests): fall back to a
        // plain blocking byte read with no timeout support.
        let mut buf = [0u8; 1];
        return match std::io::stdin().read(&mut buf) {
            Ok(0) => Ok(ReadOutcome::Eof),
            Ok(_) => Ok(ReadOutcome::Byte(buf[0])),
            Err(_) => Err(BasicError::Escape),
        };
    }

    let fd = std::io::stdin().as_raw_fd();
    let mut set = FdSet::new();
    set.insert(fd);

    let mut timeout = timeout_cs.map(|cs| {
        let ms = (cs.max(0) as u64) * 10;
        nix::sys::time::TimeVal::from(Duration::from_millis(ms))
    });

    let ready = select(None, Some(&mut set), None, None, timeout.as_mut());
    let result = match ready {
        Ok(0) => Ok(ReadOutcome::Timeout),
        Ok(_) => {
            let mut buf = [0u8; 1];
            match std::io::stdin().read(&mut buf) {
                Ok(0) => Ok(ReadOutcome::Eof),
                Ok(_) => Ok(ReadOutcome::Byte(buf[0])),
                Err(_) => Err(BasicError::Escape),
            }
        }
        Err(nix::Error::Sys(nix::errno::Errno::EINTR)) => Err(BasicError::Escape),
        Err(_) => Err(BasicError::Escape),
    };

    tty_reset();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tty_reset_is_idempotent_without_a_cbreak_session() {
        // No cbreak session has been entered; this must not panic.
        tty_reset();
        tty_reset();
    }
}
