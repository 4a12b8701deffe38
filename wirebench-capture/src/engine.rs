//! Capture Engine
//!
//! Drains the kernel capture primitive one buffer at a time and emits
//! arrival-stamped [`CapturedFrame`]s. Two backends share the same
//! contract: an `AF_PACKET` raw socket on Linux (one frame per read) and a
//! `/dev/bpf*` device on macOS/FreeBSD (several records packed per read,
//! walked via their per-record headers).
//!
//! Transient conditions (EAGAIN, EINTR, empty reads) are "no packet", not
//! errors; the caller retries after a short sleep. Anything persistent
//! surfaces as a [`CaptureError`] for the controller to act on.

use std::io;

use thiserror::Error;
use tracing::{debug, info};
use wirebench_core::{CapturedFrame, MetricsCore, MAX_FRAME_SIZE};

use crate::filter::FilterKind;

/// Default kernel read buffer for BPF devices (128 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 128 * 1024;

/// Capture device configuration.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Interface to bind, e.g. `eth0` or `en0`.
    pub interface: String,
    /// Put the interface in promiscuous mode.
    pub promiscuous: bool,
    /// Kernel classifier to install.
    pub filter: FilterKind,
    /// BPF device read-buffer size.
    pub buffer_size: usize,
    /// Per-frame capture limit.
    pub snap_len: usize,
}

impl CaptureConfig {
    /// Configuration with defaults for the named interface.
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            promiscuous: false,
            filter: FilterKind::None,
            buffer_size: DEFAULT_BUFFER_SIZE,
            snap_len: MAX_FRAME_SIZE,
        }
    }
}

/// Persistent capture failures.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The named interface does not exist.
    #[error("interface not found: {0}")]
    InterfaceNotFound(String),
    /// The capture primitive needs elevated privileges.
    #[error("opening a capture device for {interface} requires elevated privileges")]
    PermissionDenied {
        /// Interface the open was attempted for.
        interface: String,
    },
    /// The capture device could not be opened.
    #[error("failed to open capture device for {interface}: {source}")]
    Open {
        /// Interface the open was attempted for.
        interface: String,
        /// Underlying OS error.
        source: io::Error,
    },
    /// A device configuration step failed.
    #[error("capture setup failed ({op}): {source}")]
    Setup {
        /// The configuration step that failed.
        op: &'static str,
        /// Underlying OS error.
        source: io::Error,
    },
    /// The classifier program could not be installed.
    #[error("failed to install filter program: {0}")]
    FilterInstall(io::Error),
    /// A kernel read failed with a non-transient error.
    #[error("capture read failed: {0}")]
    Read(io::Error),
    /// No capture backend exists for this platform.
    #[error("packet capture is not supported on this platform")]
    Unsupported,
}

/// Field offsets of the per-record BPF header, plus the platform's record
/// alignment. `bh_hdrlen` is always read from the record itself, so only
/// these three offsets depend on the ABI.
#[cfg_attr(
    not(any(target_os = "macos", target_os = "freebsd")),
    allow(dead_code)
)]
#[derive(Debug, Clone, Copy)]
struct RecordLayout {
    caplen_off: usize,
    datalen_off: usize,
    hdrlen_off: usize,
    alignment: usize,
}

#[cfg_attr(
    not(any(target_os = "macos", target_os = "freebsd")),
    allow(dead_code)
)]
impl RecordLayout {
    fn min_header(&self) -> usize {
        self.hdrlen_off + 2
    }

    fn align(&self, len: usize) -> usize {
        (len + self.alignment - 1) & !(self.alignment - 1)
    }
}

/// `struct bpf_hdr` on macOS: 8-byte `timeval32` timestamp.
#[cfg(target_os = "macos")]
const BPF_LAYOUT: RecordLayout = RecordLayout {
    caplen_off: 8,
    datalen_off: 12,
    hdrlen_off: 16,
    alignment: 4,
};

/// `struct bpf_hdr` on 64-bit FreeBSD: 16-byte `timeval` timestamp,
/// records aligned to `sizeof(long)`.
#[cfg(target_os = "freebsd")]
const BPF_LAYOUT: RecordLayout = RecordLayout {
    caplen_off: 16,
    datalen_off: 20,
    hdrlen_off: 24,
    alignment: 8,
};

/// One record lifted out of a BPF buffer.
#[cfg_attr(
    not(any(target_os = "macos", target_os = "freebsd")),
    allow(dead_code)
)]
struct RawRecord<'a> {
    wire_len: u32,
    bytes: &'a [u8],
}

/// Walk the packed records of one BPF buffer read.
///
/// Stops at the first invalid record (`caplen == 0` or `hdrlen == 0`) or at
/// a record extending past the buffer; the remainder is discarded and the
/// caller issues a fresh read.
#[cfg_attr(
    not(any(target_os = "macos", target_os = "freebsd")),
    allow(dead_code)
)]
fn walk_records<'a>(buf: &'a [u8], layout: &RecordLayout, records: &mut Vec<RawRecord<'a>>) {
    let mut offset = 0usize;
    while offset + layout.min_header() <= buf.len() {
        let read_u32 = |at: usize| {
            u32::from_ne_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
        };
        let caplen = read_u32(offset + layout.caplen_off) as usize;
        let datalen = read_u32(offset + layout.datalen_off);
        let hdrlen =
            u16::from_ne_bytes([buf[offset + layout.hdrlen_off], buf[offset + layout.hdrlen_off + 1]])
                as usize;

        if caplen == 0 || hdrlen == 0 {
            break;
        }
        if offset + hdrlen + caplen > buf.len() {
            break;
        }

        records.push(RawRecord {
            wire_len: datalen,
            bytes: &buf[offset + hdrlen..offset + hdrlen + caplen],
        });

        offset += layout.align(hdrlen + caplen);
    }
}

/// Open capture handle bound to one interface.
///
/// The file descriptor and its kernel buffer are acquired once per process
/// and released on drop.
pub struct CaptureEngine {
    fd: i32,
    interface: String,
    snap_len: usize,
    read_buf: Vec<u8>,
    metrics: &'static MetricsCore,
}

impl CaptureEngine {
    /// Open and configure the platform capture primitive.
    pub fn open(
        config: &CaptureConfig,
        metrics: &'static MetricsCore,
    ) -> Result<Self, CaptureError> {
        let engine = Self::open_platform(config, metrics)?;
        info!(
            interface = %config.interface,
            filter = %config.filter,
            promiscuous = config.promiscuous,
            "capture engine ready"
        );
        Ok(engine)
    }

    /// Interface this engine is bound to.
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Drain one kernel read, appending emitted frames to `out`.
    ///
    /// Returns the number of frames appended; zero means "no packet right
    /// now" and the caller should retry after a short sleep.
    pub fn poll(&mut self, out: &mut Vec<CapturedFrame>) -> Result<usize, CaptureError> {
        self.poll_platform(out)
    }

    fn emit(&self, bytes: &[u8], wire_len: u32, out: &mut Vec<CapturedFrame>) {
        let kept = bytes.len().min(self.snap_len);
        if wire_len as usize > kept && self.metrics.is_active() {
            self.metrics.inc_capture_drops();
        }
        // Arrival stamp is taken here, at emission, once per frame.
        out.push(CapturedFrame::new(&bytes[..kept], wire_len));
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        if self.fd >= 0 {
            // SAFETY: fd is owned by this engine and closed exactly once.
            unsafe { libc::close(self.fd) };
            debug!(fd = self.fd, "capture device closed");
        }
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::EAGAIN) | Some(libc::EWOULDBLOCK) | Some(libc::EINTR)
    )
}

fn is_permission(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(libc::EPERM) | Some(libc::EACCES))
}

// ─── Linux: AF_PACKET raw socket ─────────────────────────────────────────────

#[cfg(target_os = "linux")]
impl CaptureEngine {
    fn open_platform(
        config: &CaptureConfig,
        metrics: &'static MetricsCore,
    ) -> Result<Self, CaptureError> {
        use std::ffi::CString;

        let ifname = CString::new(config.interface.as_str())
            .map_err(|_| CaptureError::InterfaceNotFound(config.interface.clone()))?;

        // SAFETY: plain socket(2); the fd is validated before use.
        let fd = unsafe {
            libc::socket(
                libc::AF_PACKET,
                libc::SOCK_RAW | libc::SOCK_NONBLOCK,
                i32::from((libc::ETH_P_ALL as u16).to_be()),
            )
        };
        if fd < 0 {
            let err = io::Error::last_os_error();
            if is_permission(&err) {
                return Err(CaptureError::PermissionDenied {
                    interface: config.interface.clone(),
                });
            }
            return Err(CaptureError::Open {
                interface: config.interface.clone(),
                source: err,
            });
        }
        let engine = Self {
            fd,
            interface: config.interface.clone(),
            snap_len: config.snap_len.min(MAX_FRAME_SIZE),
            read_buf: vec![0u8; config.snap_len.min(MAX_FRAME_SIZE)],
            metrics,
        };

        // SAFETY: ifname is a valid NUL-terminated string.
        let ifindex = unsafe { libc::if_nametoindex(ifname.as_ptr()) };
        if ifindex == 0 {
            return Err(CaptureError::InterfaceNotFound(config.interface.clone()));
        }

        // SAFETY: sockaddr_ll is fully initialized below before bind(2).
        unsafe {
            let mut sll: libc::sockaddr_ll = std::mem::zeroed();
            sll.sll_family = libc::AF_PACKET as u16;
            sll.sll_protocol = (libc::ETH_P_ALL as u16).to_be();
            sll.sll_ifindex = ifindex as i32;
            if libc::bind(
                engine.fd,
                &sll as *const libc::sockaddr_ll as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            ) < 0
            {
                return Err(CaptureError::Setup {
                    op: "bind AF_PACKET socket",
                    source: io::Error::last_os_error(),
                });
            }
        }

        if config.promiscuous {
            // SAFETY: packet_mreq is fully initialized; setsockopt copies it.
            unsafe {
                let mut mreq: libc::packet_mreq = std::mem::zeroed();
                mreq.mr_ifindex = ifindex as i32;
                mreq.mr_type = libc::PACKET_MR_PROMISC as u16;
                if libc::setsockopt(
                    engine.fd,
                    libc::SOL_PACKET,
                    libc::PACKET_ADD_MEMBERSHIP,
                    &mreq as *const libc::packet_mreq as *const libc::c_void,
                    std::mem::size_of::<libc::packet_mreq>() as libc::socklen_t,
                ) < 0
                {
                    return Err(CaptureError::Setup {
                        op: "enable promiscuous mode",
                        source: io::Error::last_os_error(),
                    });
                }
            }
        }

        if let Some(program) = config.filter.compile() {
            let mut insns: Vec<libc::sock_filter> = program
                .iter()
                .map(|insn| libc::sock_filter {
                    code: insn.code,
                    jt: insn.jt,
                    jf: insn.jf,
                    k: insn.k,
                })
                .collect();
            let prog = libc::sock_fprog {
                len: insns.len() as u16,
                filter: insns.as_mut_ptr(),
            };
            // SAFETY: prog points at a live instruction array; the kernel
            // copies the program during setsockopt.
            let rc = unsafe {
                libc::setsockopt(
                    engine.fd,
                    libc::SOL_SOCKET,
                    libc::SO_ATTACH_FILTER,
                    &prog as *const libc::sock_fprog as *const libc::c_void,
                    std::mem::size_of::<libc::sock_fprog>() as libc::socklen_t,
                )
            };
            if rc < 0 {
                return Err(CaptureError::FilterInstall(io::Error::last_os_error()));
            }
        }

        Ok(engine)
    }

    fn poll_platform(&mut self, out: &mut Vec<CapturedFrame>) -> Result<usize, CaptureError> {
        // SAFETY: read_buf stays alive for the whole call; MSG_TRUNC makes
        // the kernel report the full on-wire length even when it exceeds
        // the buffer.
        let n = unsafe {
            libc::recvfrom(
                self.fd,
                self.read_buf.as_mut_ptr() as *mut libc::c_void,
                self.read_buf.len(),
                libc::MSG_TRUNC,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if is_transient(&err) {
                return Ok(0);
            }
            return Err(CaptureError::Read(err));
        }
        if n == 0 {
            return Ok(0);
        }

        let wire_len = n as usize;
        let captured = wire_len.min(self.read_buf.len());
        self.emit(&self.read_buf[..captured], wire_len as u32, out);
        Ok(1)
    }
}

// ─── BSD/macOS: /dev/bpf device ──────────────────────────────────────────────

#[cfg(any(target_os = "macos", target_os = "freebsd"))]
impl CaptureEngine {
    fn open_platform(
        config: &CaptureConfig,
        metrics: &'static MetricsCore,
    ) -> Result<Self, CaptureError> {
        use std::ffi::CString;

        let mut last_err = io::Error::from_raw_os_error(libc::ENOENT);
        let mut fd = -1;
        for unit in 0..256 {
            let path = CString::new(format!("/dev/bpf{unit}")).expect("static device path");
            // SAFETY: open(2) on a candidate device path.
            let candidate = unsafe { libc::open(path.as_ptr(), libc::O_RDONLY | libc::O_NONBLOCK) };
            if candidate >= 0 {
                fd = candidate;
                debug!(device = %format!("/dev/bpf{unit}"), "BPF device opened");
                break;
            }
            last_err = io::Error::last_os_error();
            if is_permission(&last_err) {
                return Err(CaptureError::PermissionDenied {
                    interface: config.interface.clone(),
                });
            }
        }
        if fd < 0 {
            return Err(CaptureError::Open {
                interface: config.interface.clone(),
                source: last_err,
            });
        }
        let mut engine = Self {
            fd,
            interface: config.interface.clone(),
            snap_len: config.snap_len.min(MAX_FRAME_SIZE),
            read_buf: vec![0u8; config.buffer_size.max(4096)],
            metrics,
        };

        // Buffer size must be set before the interface is bound.
        let mut buf_len = engine.read_buf.len() as u32;
        // SAFETY: ioctl with a pointer to a live u32.
        if unsafe { libc::ioctl(engine.fd, libc::BIOCSBLEN, &mut buf_len) } < 0 {
            return Err(CaptureError::Setup {
                op: "set BPF buffer size",
                source: io::Error::last_os_error(),
            });
        }
        engine.read_buf.resize(buf_len as usize, 0);

        // SAFETY: ifreq is zeroed and the name copied with a bounds check.
        unsafe {
            let mut ifr: libc::ifreq = std::mem::zeroed();
            let name = config.interface.as_bytes();
            if name.len() >= ifr.ifr_name.len() {
                return Err(CaptureError::InterfaceNotFound(config.interface.clone()));
            }
            for (dst, src) in ifr.ifr_name.iter_mut().zip(name) {
                *dst = *src as libc::c_char;
            }
            if libc::ioctl(engine.fd, libc::BIOCSETIF, &ifr) < 0 {
                return Err(CaptureError::InterfaceNotFound(config.interface.clone()));
            }
        }

        let immediate: u32 = 1;
        // SAFETY: ioctl with a pointer to a live u32.
        if unsafe { libc::ioctl(engine.fd, libc::BIOCIMMEDIATE, &immediate) } < 0 {
            return Err(CaptureError::Setup {
                op: "enable immediate mode",
                source: io::Error::last_os_error(),
            });
        }

        if config.promiscuous {
            // SAFETY: BIOCPROMISC takes no argument.
            if unsafe { libc::ioctl(engine.fd, libc::BIOCPROMISC) } < 0 {
                return Err(CaptureError::Setup {
                    op: "enable promiscuous mode",
                    source: io::Error::last_os_error(),
                });
            }
        }

        if let Some(program) = config.filter.compile() {
            let mut insns: Vec<libc::bpf_insn> = program
                .iter()
                .map(|insn| libc::bpf_insn {
                    code: insn.code,
                    jt: insn.jt,
                    jf: insn.jf,
                    k: insn.k,
                })
                .collect();
            let prog = libc::bpf_program {
                bf_len: insns.len() as libc::c_uint,
                bf_insns: insns.as_mut_ptr(),
            };
            // SAFETY: prog points at a live instruction array; the kernel
            // copies the program during the ioctl.
            if unsafe { libc::ioctl(engine.fd, libc::BIOCSETF, &prog) } < 0 {
                return Err(CaptureError::FilterInstall(io::Error::last_os_error()));
            }
        }

        Ok(engine)
    }

    fn poll_platform(&mut self, out: &mut Vec<CapturedFrame>) -> Result<usize, CaptureError> {
        // SAFETY: read_buf stays alive for the whole call.
        let n = unsafe {
            libc::read(
                self.fd,
                self.read_buf.as_mut_ptr() as *mut libc::c_void,
                self.read_buf.len(),
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if is_transient(&err) {
                return Ok(0);
            }
            return Err(CaptureError::Read(err));
        }
        if n == 0 {
            return Ok(0);
        }

        let mut records = Vec::new();
        walk_records(&self.read_buf[..n as usize], &BPF_LAYOUT, &mut records);
        let emitted = records.len();
        for record in &records {
            self.emit(record.bytes, record.wire_len, out);
        }
        Ok(emitted)
    }
}

// ─── Other platforms ─────────────────────────────────────────────────────────

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "freebsd")))]
impl CaptureEngine {
    fn open_platform(
        config: &CaptureConfig,
        _metrics: &'static MetricsCore,
    ) -> Result<Self, CaptureError> {
        let _ = config;
        Err(CaptureError::Unsupported)
    }

    fn poll_platform(&mut self, _out: &mut Vec<CapturedFrame>) -> Result<usize, CaptureError> {
        Err(CaptureError::Unsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Classic 18-byte bpf_hdr layout (8-byte timestamp) used by the
    /// walker tests; matches the macOS ABI.
    const TEST_LAYOUT: RecordLayout = RecordLayout {
        caplen_off: 8,
        datalen_off: 12,
        hdrlen_off: 16,
        alignment: 4,
    };
    const TEST_HDRLEN: usize = 18;

    fn push_record(buf: &mut Vec<u8>, payload: &[u8], datalen: u32, layout: &RecordLayout) {
        let start = buf.len();
        buf.resize(start + TEST_HDRLEN, 0);
        buf[start + layout.caplen_off..start + layout.caplen_off + 4]
            .copy_from_slice(&(payload.len() as u32).to_ne_bytes());
        buf[start + layout.datalen_off..start + layout.datalen_off + 4]
            .copy_from_slice(&datalen.to_ne_bytes());
        buf[start + layout.hdrlen_off..start + layout.hdrlen_off + 2]
            .copy_from_slice(&(TEST_HDRLEN as u16).to_ne_bytes());
        buf.extend_from_slice(payload);
        // Pad to the record alignment boundary.
        while buf.len() % layout.alignment != 0 {
            buf.push(0);
        }
    }

    #[test]
    fn test_walk_single_record() {
        let mut buf = Vec::new();
        push_record(&mut buf, &[0xAA; 60], 60, &TEST_LAYOUT);

        let mut records = Vec::new();
        walk_records(&buf, &TEST_LAYOUT, &mut records);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].bytes.len(), 60);
        assert_eq!(records[0].wire_len, 60);
        assert_eq!(records[0].bytes[0], 0xAA);
    }

    #[test]
    fn test_walk_multiple_packed_records() {
        let mut buf = Vec::new();
        push_record(&mut buf, &[1; 33], 33, &TEST_LAYOUT); // odd length forces padding
        push_record(&mut buf, &[2; 64], 64, &TEST_LAYOUT);
        push_record(&mut buf, &[3; 17], 17, &TEST_LAYOUT);

        let mut records = Vec::new();
        walk_records(&buf, &TEST_LAYOUT, &mut records);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].bytes[0], 1);
        assert_eq!(records[1].bytes[0], 2);
        assert_eq!(records[2].bytes[0], 3);
    }

    #[test]
    fn test_walk_reports_kernel_truncation() {
        let mut buf = Vec::new();
        // Kernel captured 40 of a 1500-byte frame.
        push_record(&mut buf, &[7; 40], 1500, &TEST_LAYOUT);

        let mut records = Vec::new();
        walk_records(&buf, &TEST_LAYOUT, &mut records);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].bytes.len(), 40);
        assert_eq!(records[0].wire_len, 1500);
    }

    #[test]
    fn test_walk_stops_on_zero_caplen() {
        let mut buf = Vec::new();
        push_record(&mut buf, &[1; 20], 20, &TEST_LAYOUT);
        // A zeroed region looks like caplen == 0: remainder is discarded.
        buf.extend_from_slice(&[0u8; 64]);

        let mut records = Vec::new();
        walk_records(&buf, &TEST_LAYOUT, &mut records);
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_walk_stops_on_record_past_buffer() {
        let mut buf = Vec::new();
        push_record(&mut buf, &[1; 20], 20, &TEST_LAYOUT);
        let valid_len = buf.len();
        push_record(&mut buf, &[2; 100], 100, &TEST_LAYOUT);
        buf.truncate(valid_len + TEST_HDRLEN + 10); // second record cut short

        let mut records = Vec::new();
        walk_records(&buf, &TEST_LAYOUT, &mut records);
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_walk_empty_buffer() {
        let mut records = Vec::new();
        walk_records(&[], &TEST_LAYOUT, &mut records);
        assert!(records.is_empty());
    }

    #[test]
    fn test_walk_freebsd_alignment() {
        let layout = RecordLayout {
            caplen_off: 8,
            datalen_off: 12,
            hdrlen_off: 16,
            alignment: 8,
        };
        let mut buf = Vec::new();
        push_record(&mut buf, &[1; 21], 21, &layout);
        let second_start = buf.len();
        assert_eq!(second_start % 8, 0);
        push_record(&mut buf, &[2; 30], 30, &layout);

        let mut records = Vec::new();
        walk_records(&buf, &layout, &mut records);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].bytes[0], 2);
    }
}
