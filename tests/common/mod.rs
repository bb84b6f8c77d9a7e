#![allow(dead_code)]

use std::io::Write;
use std::path::PathBuf;

use tempfile::TempDir;

pub const TCP: u8 = 6;
pub const UDP: u8 = 17;

pub const FIN: u8 = 0x01;
pub const SYN: u8 = 0x02;
pub const RST: u8 = 0x04;
pub const PSH: u8 = 0x08;
pub const ACK: u8 = 0x10;

/// Builder for raw TSH records
#[derive(Clone, Debug)]
pub struct RecordBuilder {
    pub seconds: u32,
    pub micros: u32,
    pub interface: u8,
    pub version_ihl: u8,
    pub tos: u8,
    pub total_length: u16,
    pub flags_fragment: u16,
    pub protocol: u8,
    pub src: u32,
    pub dst: u32,
    pub sport: u16,
    pub dport: u16,
    pub seq: u32,
    pub ack: u32,
    pub data_offset: u8,
    pub tcp_flags: u8,
    pub window: u16,
}

impl Default for RecordBuilder {
    fn default() -> Self {
        RecordBuilder {
            seconds: 1_000,
            micros: 0,
            interface: 0,
            version_ihl: 0x45,
            tos: 0,
            total_length: 40,
            flags_fragment: 0x4000,
            protocol: TCP,
            src: 0x0a00_000c,
            dst: 0x9bcf_0001,
            sport: 1024,
            dport: 80,
            seq: 1000,
            ack: 0,
            data_offset: 0x50,
            tcp_flags: ACK,
            window: 8192,
        }
    }
}

impl RecordBuilder {
    pub fn at(mut self, seconds: u32, micros: u32) -> Self {
        self.seconds = seconds;
        self.micros = micros;
        self
    }

    /// A TCP segment with `payload` bytes after option-free headers
    pub fn tcp_payload(mut self, payload: u16) -> Self {
        self.protocol = TCP;
        self.data_offset = 0x50;
        self.total_length = 40 + payload;
        self
    }

    pub fn reversed(mut self) -> Self {
        std::mem::swap(&mut self.src, &mut self.dst);
        std::mem::swap(&mut self.sport, &mut self.dport);
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut v = Vec::with_capacity(44);
        v.extend_from_slice(&self.seconds.to_be_bytes());
        v.push(self.interface);
        v.extend_from_slice(&self.micros.to_be_bytes()[1..]);
        v.push(self.version_ihl);
        v.push(self.tos);
        v.extend_from_slice(&self.total_length.to_be_bytes());
        v.extend_from_slice(&0x1234u16.to_be_bytes());
        v.extend_from_slice(&self.flags_fragment.to_be_bytes());
        v.push(64);
        v.push(self.protocol);
        v.extend_from_slice(&0u16.to_be_bytes());
        v.extend_from_slice(&self.src.to_be_bytes());
        v.extend_from_slice(&self.dst.to_be_bytes());
        v.extend_from_slice(&self.sport.to_be_bytes());
        v.extend_from_slice(&self.dport.to_be_bytes());
        v.extend_from_slice(&self.seq.to_be_bytes());
        v.extend_from_slice(&self.ack.to_be_bytes());
        v.push(self.data_offset);
        v.push(self.tcp_flags);
        v.extend_from_slice(&self.window.to_be_bytes());
        assert_eq!(v.len(), 44);
        v
    }
}

/// Write records to a trace file in a fresh temporary directory
pub fn write_trace(records: &[RecordBuilder]) -> (TempDir, PathBuf) {
    let mut bytes = Vec::new();
    for r in records {
        bytes.extend_from_slice(&r.to_bytes());
    }
    write_raw(&bytes)
}

pub fn write_raw(bytes: &[u8]) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("trace.tsh");
    let mut file = std::fs::File::create(&path).expect("create trace");
    file.write_all(bytes).expect("write trace");
    (dir, path)
}
