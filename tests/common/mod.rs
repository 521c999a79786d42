//! Shared fixtures: synthetic snapshot buffers laid out the way the kernel
//! returns SystemProcessInformation, plus a scripted query implementation.

#![allow(dead_code)]

use std::collections::VecDeque;

use parking_lot::Mutex;

use procsnap::{SystemQuery, STATUS_INFO_LENGTH_MISMATCH, SYSTEM_PROCESS_INFORMATION_CLASS};

// 64-bit SystemProcessInformation record offsets.
pub const NEXT_ENTRY_OFFSET: usize = 0x00;
pub const NUMBER_OF_THREADS: usize = 0x04;
pub const CREATE_TIME: usize = 0x20;
pub const USER_TIME: usize = 0x28;
pub const KERNEL_TIME: usize = 0x30;
pub const IMAGE_NAME_LENGTH: usize = 0x38;
pub const IMAGE_NAME_BUFFER: usize = 0x40;
pub const UNIQUE_PROCESS_ID: usize = 0x50;
pub const INHERITED_FROM_PID: usize = 0x58;
pub const HANDLE_COUNT: usize = 0x60;
pub const SESSION_ID: usize = 0x64;
pub const WORKING_SET_SIZE: usize = 0x90;
pub const FIXED_PART_LEN: usize = 0x98;

pub fn put_u16(buf: &mut [u8], at: usize, value: u16) {
    buf[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

pub fn put_u32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

pub fn put_u64(buf: &mut [u8], at: usize, value: u64) {
    buf[at..at + 8].copy_from_slice(&value.to_le_bytes());
}

pub fn put_i64(buf: &mut [u8], at: usize, value: i64) {
    put_u64(buf, at, value as u64);
}

/// Blueprint for one synthetic process record.
#[derive(Debug, Clone)]
pub struct SynthProcess {
    pub pid: u32,
    pub parent_pid: u32,
    /// `None` encodes a nameless record (null name pointer).
    pub name: Option<&'static str>,
    pub session_id: u32,
    pub threads: u32,
    pub handles: u32,
    pub working_set: u64,
    pub user_ticks: i64,
    pub kernel_ticks: i64,
    pub create_ticks: i64,
}

impl Default for SynthProcess {
    fn default() -> Self {
        Self {
            pid: 0,
            parent_pid: 0,
            name: None,
            session_id: 0,
            threads: 1,
            handles: 10,
            working_set: 4 << 20,
            user_ticks: 0,
            kernel_ticks: 0,
            create_ticks: 0,
        }
    }
}

impl SynthProcess {
    pub fn named(pid: u32, name: &'static str) -> Self {
        Self {
            pid,
            name: Some(name),
            ..Self::default()
        }
    }

    pub fn nameless(pid: u32) -> Self {
        Self {
            pid,
            ..Self::default()
        }
    }
}

pub fn total_threads(procs: &[SynthProcess]) -> u64 {
    procs.iter().map(|p| p.threads as u64).sum()
}

pub fn total_handles(procs: &[SynthProcess]) -> u64 {
    procs.iter().map(|p| p.handles as u64).sum()
}

/// Encoded record chain plus the name-pointer fixups left to apply. The
/// kernel writes absolute name pointers, so the builder can only finish
/// the job once the destination address is known.
pub struct EncodedSnapshot {
    pub bytes: Vec<u8>,
    /// (offset of the name Buffer field, offset of the name bytes)
    fixups: Vec<(usize, usize)>,
}

impl EncodedSnapshot {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Copy into `dest` and rewrite each name pointer as the kernel would:
    /// an absolute address inside `dest`.
    pub fn write_into(&self, dest: &mut [u8]) {
        dest[..self.bytes.len()].copy_from_slice(&self.bytes);
        let base = dest.as_ptr() as u64;
        for &(field_at, name_at) in &self.fixups {
            put_u64(dest, field_at, base + name_at as u64);
        }
    }
}

/// Lay `procs` out the way the kernel does: fixed part, name bytes behind
/// it, records 8-aligned, NextEntryOffset chaining with zero on the last.
pub fn encode_snapshot(procs: &[SynthProcess]) -> EncodedSnapshot {
    let mut bytes = Vec::new();
    let mut fixups = Vec::new();

    for (index, proc) in procs.iter().enumerate() {
        let record_at = bytes.len();
        let name_utf16: Vec<u8> = proc
            .name
            .unwrap_or_default()
            .encode_utf16()
            .flat_map(|unit| unit.to_le_bytes())
            .collect();
        let record_len = align8(FIXED_PART_LEN + name_utf16.len());
        bytes.resize(record_at + record_len, 0);

        let next = if index + 1 == procs.len() {
            0
        } else {
            record_len as u32
        };
        put_u32(&mut bytes, record_at + NEXT_ENTRY_OFFSET, next);
        put_u32(&mut bytes, record_at + NUMBER_OF_THREADS, proc.threads);
        put_i64(&mut bytes, record_at + CREATE_TIME, proc.create_ticks);
        put_i64(&mut bytes, record_at + USER_TIME, proc.user_ticks);
        put_i64(&mut bytes, record_at + KERNEL_TIME, proc.kernel_ticks);
        put_u64(&mut bytes, record_at + UNIQUE_PROCESS_ID, proc.pid as u64);
        put_u64(&mut bytes, record_at + INHERITED_FROM_PID, proc.parent_pid as u64);
        put_u32(&mut bytes, record_at + HANDLE_COUNT, proc.handles);
        put_u32(&mut bytes, record_at + SESSION_ID, proc.session_id);
        put_u64(&mut bytes, record_at + WORKING_SET_SIZE, proc.working_set);

        if !name_utf16.is_empty() {
            let name_at = record_at + FIXED_PART_LEN;
            bytes[name_at..name_at + name_utf16.len()].copy_from_slice(&name_utf16);
            put_u16(
                &mut bytes,
                record_at + IMAGE_NAME_LENGTH,
                name_utf16.len() as u16,
            );
            fixups.push((record_at + IMAGE_NAME_BUFFER, name_at));
        }
    }

    EncodedSnapshot { bytes, fixups }
}

fn align8(len: usize) -> usize {
    (len + 7) & !7
}

pub fn required_size(procs: &[SynthProcess]) -> u32 {
    encode_snapshot(procs).bytes.len() as u32
}

/// One scripted reply from the fake kernel.
pub enum Reply {
    /// Report `needed` and return STATUS_INFO_LENGTH_MISMATCH. Also the
    /// shape of a sizing probe's answer.
    TooSmall { needed: u32 },
    /// Encode the processes into the caller's buffer and return success.
    Deliver(Vec<SynthProcess>),
    /// Copy raw bytes verbatim (structural-failure scenarios).
    DeliverRaw(Vec<u8>),
    /// Fail with this NTSTATUS.
    Fail { status: i32 },
}

/// What the reader asked for on one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryCall {
    pub probe: bool,
    pub capacity: Option<usize>,
}

/// Scripted stand-in for the kernel query: each call consumes the next
/// reply and lands in the call log.
pub struct FakeQuery {
    script: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<QueryCall>>,
}

impl FakeQuery {
    pub fn scripted(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            script: Mutex::new(replies.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Probe-then-deliver pair serving one refresh of `procs`.
    pub fn serving(procs: Vec<SynthProcess>) -> Self {
        let fake = Self::scripted([]);
        fake.push_refresh(procs);
        fake
    }

    /// Append a probe-then-deliver pair for one further refresh.
    pub fn push_refresh(&self, procs: Vec<SynthProcess>) {
        let needed = required_size(&procs);
        let mut script = self.script.lock();
        script.push_back(Reply::TooSmall { needed });
        script.push_back(Reply::Deliver(procs));
    }

    pub fn push(&self, reply: Reply) {
        self.script.lock().push_back(reply);
    }

    pub fn calls(&self) -> Vec<QueryCall> {
        self.calls.lock().clone()
    }
}

impl SystemQuery for FakeQuery {
    fn query(&self, class: u32, buf: Option<&mut [u8]>, needed: &mut u32) -> i32 {
        assert_eq!(class, SYSTEM_PROCESS_INFORMATION_CLASS);
        self.calls.lock().push(QueryCall {
            probe: buf.is_none(),
            capacity: buf.as_ref().map(|b| b.len()),
        });

        let reply = self
            .script
            .lock()
            .pop_front()
            .expect("kernel query called more times than scripted");

        match reply {
            Reply::TooSmall { needed: size } => {
                *needed = size;
                STATUS_INFO_LENGTH_MISMATCH
            }
            Reply::Deliver(procs) => {
                let image = encode_snapshot(&procs);
                *needed = image.len() as u32;
                match buf {
                    Some(dest) if dest.len() >= image.len() => {
                        image.write_into(dest);
                        0
                    }
                    _ => STATUS_INFO_LENGTH_MISMATCH,
                }
            }
            Reply::DeliverRaw(bytes) => {
                *needed = bytes.len() as u32;
                match buf {
                    Some(dest) if dest.len() >= bytes.len() => {
                        dest[..bytes.len()].copy_from_slice(&bytes);
                        0
                    }
                    _ => STATUS_INFO_LENGTH_MISMATCH,
                }
            }
            Reply::Fail { status } => status,
        }
    }
}
