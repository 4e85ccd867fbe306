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

//! The open-file registry and the binary record protocol backing
//! `PRINT#`/`INPUT#`/`BPUT#`/`BGET#`/`PTR#`/`EOF#`/`EXT#`.
//!
//! The double encoding is host-endian IEEE-754, deliberately different
//! from the BBC Micro's bespoke 5-byte float -- round-tripping a data
//! file across machines of different endianness is not guaranteed, and
//! that's an accepted divergence rather than an oversight.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{BigEndian, NativeEndian, ReadBytesExt, WriteBytesExt};

use crate::error::BasicError::{self, *};
use crate::value::Value;

const INT_TAG: u8 = 0x40;
const FLOAT_TAG: u8 = 0xFF;
const STRING_TAG: u8 = 0x00;

/// First three fds are stdin/stdout/stderr and are never registered;
/// channels start numbering at 3.
const FIRST_FD: i32 = 3;

pub struct FileChannel {
    file: File,
    pub ptr: u64,
}

#[derive(Default)]
pub struct FileRegistry {
    files: HashMap<i32, FileChannel>,
    next_fd: i32,
}

impl FileRegistry {
    pub fn new() -> FileRegistry {
        FileRegistry { files: HashMap::new(), next_fd: FIRST_FD }
    }

    fn register(&mut self, file: File) -> i32 {
        let fd = self.next_fd;
        self.next_fd += 1;
        self.files.insert(fd, FileChannel { file, ptr: 0 });
        fd
    }

    /// Returns 0 on failure rather than an error, per the builtin table:
    /// `OPENIN/OPENOUT/OPENUP` fail silently into fd 0.
    pub fn open_in(&mut self, path: &str) -> i32 {
        File::open(path).map(|f| self.register(f)).unwrap_or(0)
    }

    pub fn open_out(&mut self, path: &str) -> i32 {
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map(|f| self.register(f))
            .unwrap_or(0)
    }

    pub fn open_up(&mut self, path: &str) -> i32 {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map(|f| self.register(f))
            .unwrap_or(0)
    }

    pub fn close(&mut self, fd: i32) -> Result<(), BasicError> {
        self.files.remove(&fd).map(|_| ()).ok_or(Channel)
    }

    fn channel_mut(&mut self, fd: i32) -> Result<&mut FileChannel, BasicError> {
        if fd < FIRST_FD {
            return Err(Channel);
        }
        self.files.get_mut(&fd).ok_or(Channel)
    }

    /// `PTR#(fd)`: the logical pointer, not an `lseek` offset.
    pub fn ptr(&self, fd: i32) -> Result<i32, BasicError> {
        if fd < FIRST_FD {
            return Err(Channel);
        }
        self.files.get(&fd).map(|c| c.ptr as i32).ok_or(Channel)
    }

    /// `EXT#(fd)`: file size via metadata.
    pub fn ext(&self, fd: i32) -> Result<i32, BasicError> {
        if fd < FIRST_FD {
            return Err(Channel);
        }
        let chan = self.files.get(&fd).ok_or(Channel)?;
        let meta = chan.file.metadata().map_err(|_| Channel)?;
        if !meta.is_file() {
            return Err(Channel);
        }
        Ok(meta.len() as i32)
    }

    /// `EOF#(fd)`: -1 iff the logical pointer has reached the file size.
    /// Racy against concurrent writers by another process, preserved
    /// verbatim from the original.
    pub fn eof(&self, fd: i32) -> Result<i32, BasicError> {
        if fd < FIRST_FD {
            return Err(Channel);
        }
        let chan = self.files.get(&fd).ok_or(Channel)?;
        let size = chan.file.metadata().map_err(|_| Channel)?.len();
        Ok(if chan.ptr >= size { -1 } else { 0 })
    }

    pub fn bget(&mut self, fd: i32) -> Result<i32, BasicError> {
        let chan = self.channel_mut(fd)?;
        let mut buf = [0u8; 1];
        match chan.file.read_exact(&mut buf) {
            Ok(()) => {
                chan.ptr += 1;
                Ok(buf[0] as i32)
            }
            Err(_) => Err(Eof),
        }
    }

    pub fn bput(&mut self, fd: i32, byte: u8) -> Result<(), BasicError> {
        let chan = self.channel_mut(fd)?;
        chan.file.write_all(&[byte]).map_err(|_| Channel)?;
        chan.ptr += 1;
        Ok(())
    }

    /// Writes one self-describing record and advances the logical
    /// pointer by one record.
    pub fn print_hash(&mut self, fd: i32, value: &Value) -> Result<(), BasicError> {
        let chan = self.channel_mut(fd)?;
        match value {
            Value::Int(n) => {
                chan.file.write_u8(INT_TAG).map_err(|_| Channel)?;
                chan.file.write_i32::<BigEndian>(*n).map_err(|_| Channel)?;
            }
            Value::Float(f) => {
                chan.file.write_u8(FLOAT_TAG).map_err(|_| Channel)?;
                chan.file.write_f64::<NativeEndian>(*f).map_err(|_| Channel)?;
            }
            Value::Str(s) => {
                let bytes = s.as_bytes();
                let len = bytes.len().min(255) as u8;
                chan.file.write_u8(STRING_TAG).map_err(|_| Channel)?;
                chan.file.write_u8(len).map_err(|_| Channel)?;
                chan.file.write_all(&bytes[..len as usize]).map_err(|_| Channel)?;
            }
        }
        chan.ptr += 1;
        Ok(())
    }

    /// Reads one self-describing record, type-checking it against the
    /// target variable's kind (caller passes the expected tag).
    pub fn input_hash(&mut self, fd: i32) -> Result<Value, BasicError> {
        let chan = self.channel_mut(fd)?;
        let tag = chan.file.read_u8().map_err(|_| Eof)?;
        let value = match tag {
            INT_TAG => Value::Int(chan.file.read_i32::<BigEndian>().map_err(|_| Eof)?),
            FLOAT_TAG => Value::Float(chan.file.read_f64::<NativeEndian>().map_err(|_| Eof)?),
            STRING_TAG => {
                let len = chan.file.read_u8().map_err(|_| Eof)?;
                let mut buf = vec![0u8; len as usize];
                chan.file.read_exact(&mut buf).map_err(|_| Eof)?;
                Value::Str(String::from_utf8_lossy(&buf).into_owned())
            }
            _ => return Err(Channel),
        };
        chan.ptr += 1;
        Ok(value)
    }

    /// `PTR#(fd) = n`: re-positions the logical pointer by parsing
    /// forward from offset 0, record by record, until the requested
    /// count is reached -- matching the original's treatment of the
    /// logical pointer as record-indexed rather than byte-indexed.
    pub fn set_ptr(&mut self, fd: i32, target: i32) -> Result<(), BasicError> {
        let chan = self.channel_mut(fd)?;
        chan.file.seek(SeekFrom::Start(0)).map_err(|_| Channel)?;
        let mut count = 0u64;
        while count < target as u64 {
            let tag = match chan.file.read_u8() {
                Ok(t) => t,
                Err(_) => break,
            };
            match tag {
                INT_TAG => {
                    chan.file.seek(SeekFrom::Current(4)).map_err(|_| Channel)?;
                }
                FLOAT_TAG => {
                    chan.file.seek(SeekFrom::Current(8)).map_err(|_| Channel)?;
                }
                STRING_TAG => {
                    let len = chan.file.read_u8().map_err(|_| Channel)?;
                    chan.file.seek(SeekFrom::Current(len as i64)).map_err(|_| Channel)?;
                }
                _ => return Err(Channel),
            }
            count += 1;
        }
        chan.ptr = count;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env::temp_dir;

    fn temp_path(name: &str) -> String {
        temp_dir().join(format!("bbasic-test-{}-{}", std::process::id(), name))
            .to_string_lossy()
            .into_owned()
    }

    #[test]
    fn print_hash_then_input_hash_round_trips() {
        let path = temp_path("roundtrip.dat");
        let mut reg = FileRegistry::new();
        let out = reg.open_out(&path);
        assert!(out >= FIRST_FD);
        reg.print_hash(out, &Value::Int(42)).unwrap();
        reg.print_hash(out, &Value::Str("hi".into())).unwrap();
        reg.print_hash(out, &Value::Float(3.5)).unwrap();
        reg.close(out).unwrap();

        let inp = reg.open_in(&path);
        let a = reg.input_hash(inp).unwrap();
        let b = reg.input_hash(inp).unwrap();
        let c = reg.input_hash(inp).unwrap();
        reg.close(inp).unwrap();
        let _ = std::fs::remove_file(&path);

        assert!(matches!(a, Value::Int(42)));
        assert!(matches!(b, Value::Str(ref s) if s == "hi"));
        assert!(matches!(c, Value::Float(f) if (f - 3.5).abs() < 1e-12));
    }

    #[test]
    fn low_fds_are_always_channel_errors() {
        let reg = FileRegistry::new();
        assert_eq!(reg.ptr(0), Err(Channel));
        assert_eq!(reg.ptr(2), Err(Channel));
    }

    #[test]
    fn bget_past_end_of_file_is_eof() {
        let path = temp_path("empty.dat");
        let mut reg = FileRegistry::new();
        let out = reg.open_out(&path);
        reg.close(out).unwrap();
        let inp = reg.open_in(&path);
        assert_eq!(reg.bget(inp), Err(Eof));
        let _ = std::fs::remove_file(&path);
    }
}
