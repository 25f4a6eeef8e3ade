// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The tagged-value codec: a line-oriented, self-delimiting text encoding
//! over a process-scoped input or output handle.
//!
//! Numbers, identifiers, and string lengths each occupy their own line;
//! strings are newline-terminated (we don't need embedded-newline support,
//! since the only multi-line payloads in the format -- verb programs -- are
//! handled by the external bytecode collaborator via [`Dbio::read_program_blob`]
//! / [`Dbio::write_program_blob`]). Any I/O failure or parse mismatch raises
//! [`DbioError`], the recoverable `dbio_failed` signal: the top-level load
//! and dump paths catch it with `?` and abort cleanly.

use crate::objid::Objid;
use crate::var::{TYPE_INT, TYPE_LIST, TYPE_OBJ, TYPE_STR, Var};
use std::io::{self, BufRead, Write};
use tracing::trace;

#[derive(Debug, thiserror::Error)]
pub enum DbioError {
    #[error("io error @ line {1}: {0}")]
    Io(#[source] io::Error, usize),
    #[error("parse error @ line {1}: {0}")]
    Parse(String, usize),
}

/// Narrow contract standing in for the real string-interning pool, which
/// lives outside this crate. The default implementation just allocates, but
/// callers embedding this crate in a real server wire in the shared pool.
pub trait Interner {
    fn intern(&mut self, s: &str) -> String {
        s.to_string()
    }
}

/// No-op interner used when the caller doesn't have a pool handy (tests,
/// standalone CLI use).
pub struct NullInterner;
impl Interner for NullInterner {}

/// Reads the tagged-value wire format from a process-wide input handle.
pub struct DbioReader<R: BufRead> {
    reader: R,
    pub line_num: usize,
}

impl<R: BufRead> DbioReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, line_num: 0 }
    }

    /// Read and return one line, with the trailing `\n`/`\r` stripped. This
    /// is the primitive every other `read_*` method is built from.
    pub fn read_line(&mut self) -> Result<String, DbioError> {
        let mut buf = String::new();
        let n = self
            .reader
            .read_line(&mut buf)
            .map_err(|e| DbioError::Io(e, self.line_num))?;
        if n == 0 {
            return Err(DbioError::Io(
                io::Error::new(io::ErrorKind::UnexpectedEof, "unexpected end of file"),
                self.line_num,
            ));
        }
        self.line_num += 1;
        while buf.ends_with('\n') || buf.ends_with('\r') {
            buf.pop();
        }
        Ok(buf)
    }

    pub fn read_num(&mut self) -> Result<i64, DbioError> {
        let line = self.read_line()?;
        line.trim()
            .parse()
            .map_err(|_| DbioError::Parse(format!("invalid number: {line}"), self.line_num))
    }

    pub fn read_objid(&mut self) -> Result<Objid, DbioError> {
        let line = self.read_line()?;
        let n: i32 = line
            .trim()
            .parse()
            .map_err(|_| DbioError::Parse(format!("invalid objid: {line}"), self.line_num))?;
        Ok(Objid(n))
    }

    /// An ephemeral string: read verbatim, never interned.
    pub fn read_ephemeral_string(&mut self) -> Result<String, DbioError> {
        self.read_line()
    }

    /// An interned string, passed through the caller's string pool.
    pub fn read_interned_string(
        &mut self,
        interner: &mut dyn Interner,
    ) -> Result<String, DbioError> {
        let s = self.read_line()?;
        Ok(interner.intern(&s))
    }

    /// Read a "scanf-formatted" summary line of the shape `<n> <suffix>`,
    /// e.g. `"3 clocks"` or `"0 active connections"`, as used by the
    /// task-queue and connection sections. Returns the leading count.
    pub fn read_counted_line(&mut self, suffix: &str) -> Result<usize, DbioError> {
        let line = self.read_line()?;
        let Some(count_str) = line.strip_suffix(suffix) else {
            return Err(DbioError::Parse(
                format!("expected line ending in {suffix:?}, got {line:?}"),
                self.line_num,
            ));
        };
        count_str
            .trim()
            .parse()
            .map_err(|_| DbioError::Parse(format!("invalid count in {line:?}"), self.line_num))
    }

    /// Read a compound `Var`, dispatched by its leading type tag.
    pub fn read_var(&mut self) -> Result<Var, DbioError> {
        let tag = self.read_num()?;
        self.read_var_value(tag)
    }

    pub fn read_var_value(&mut self, tag: i64) -> Result<Var, DbioError> {
        match tag {
            TYPE_INT => Ok(Var::Int(self.read_num()?)),
            TYPE_OBJ => Ok(Var::Obj(self.read_objid()?)),
            TYPE_STR => Ok(Var::Str(self.read_ephemeral_string()?)),
            TYPE_LIST => {
                let len = self.read_num()?;
                if len < 0 {
                    return Err(DbioError::Parse(
                        format!("negative list length: {len}"),
                        self.line_num,
                    ));
                }
                let mut items = Vec::with_capacity(len as usize);
                for _ in 0..len {
                    items.push(self.read_var()?);
                }
                Ok(Var::List(items))
            }
            other => Err(DbioError::Parse(
                format!("unknown var type tag: {other}"),
                self.line_num,
            )),
        }
    }

    /// The external bytecode collaborator's payload: a length-prefixed
    /// blob of opaque text (source or serialized bytecode). This crate
    /// never interprets it.
    pub fn read_program_blob(&mut self) -> Result<Option<String>, DbioError> {
        let nlines = self.read_num()?;
        if nlines < 0 {
            return Ok(None);
        }
        let mut lines = Vec::with_capacity(nlines as usize);
        for _ in 0..nlines {
            lines.push(self.read_ephemeral_string()?);
        }
        Ok(Some(lines.join("\n")))
    }
}

/// Writes the tagged-value wire format to a process-wide output handle.
pub struct DbioWriter<W: Write> {
    writer: W,
}

impl<W: Write> DbioWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn wline(&mut self, s: impl AsRef<str>) -> Result<(), DbioError> {
        writeln!(self.writer, "{}", s.as_ref()).map_err(|e| DbioError::Io(e, 0))
    }

    pub fn write_num(&mut self, n: i64) -> Result<(), DbioError> {
        self.wline(n.to_string())
    }

    pub fn write_objid(&mut self, o: Objid) -> Result<(), DbioError> {
        self.wline(o.0.to_string())
    }

    pub fn write_ephemeral_string(&mut self, s: &str) -> Result<(), DbioError> {
        self.wline(s)
    }

    pub fn write_interned_string(&mut self, s: &str) -> Result<(), DbioError> {
        // Interning is a read-side concept (dedup on load); on write we
        // simply emit the string's text.
        self.wline(s)
    }

    pub fn write_counted_line(&mut self, count: usize, suffix: &str) -> Result<(), DbioError> {
        self.wline(format!("{count}{suffix}"))
    }

    pub fn write_var(&mut self, v: &Var) -> Result<(), DbioError> {
        self.write_num(v.type_tag())?;
        match v {
            Var::Int(i) => self.write_num(*i),
            Var::Obj(o) => self.write_objid(*o),
            Var::Str(s) => self.write_ephemeral_string(s),
            Var::List(items) => {
                self.write_num(items.len() as i64)?;
                for item in items {
                    self.write_var(item)?;
                }
                Ok(())
            }
        }
    }

    pub fn write_program_blob(&mut self, program: Option<&str>) -> Result<(), DbioError> {
        match program {
            None => self.write_num(-1),
            Some(src) => {
                let lines: Vec<&str> = src.split('\n').collect();
                self.write_num(lines.len() as i64)?;
                for line in lines {
                    self.write_ephemeral_string(line)?;
                }
                Ok(())
            }
        }
    }

    pub fn flush(&mut self) -> Result<(), DbioError> {
        trace!("flushing dbio writer");
        self.writer.flush().map_err(|e| DbioError::Io(e, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;

    #[test]
    fn round_trip_var() {
        let v = Var::List(vec![
            Var::Int(42),
            Var::Obj(Objid(7)),
            Var::Str("hello".into()),
            Var::List(vec![]),
        ]);
        let mut buf = Vec::new();
        let mut w = DbioWriter::new(&mut buf);
        w.write_var(&v).unwrap();

        let mut r = DbioReader::new(BufReader::new(buf.as_slice()));
        let got = r.read_var().unwrap();
        assert_eq!(got, v);
    }

    #[test]
    fn counted_line_round_trip() {
        let mut buf = Vec::new();
        let mut w = DbioWriter::new(&mut buf);
        w.write_counted_line(3, " clocks").unwrap();
        let mut r = DbioReader::new(BufReader::new(buf.as_slice()));
        assert_eq!(r.read_counted_line(" clocks").unwrap(), 3);
    }

    #[test]
    fn truncated_input_is_dbio_failed() {
        let mut r = DbioReader::new(BufReader::new("".as_bytes()));
        assert!(r.read_num().is_err());
    }
}
