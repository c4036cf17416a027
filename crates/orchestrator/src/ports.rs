//! Port allocator: three disjoint numeric ranges with a rotating cursor.
//!
//! One lock guards three independent `(lo, hi, next, used)` sub-allocators.
//! `parking_lot::Mutex` is enough here — no allocator method calls back into
//! another while holding the lock, and allocation/reservation are never
//! attempted while holding the state store's lock.

use std::collections::HashSet;

use parking_lot::Mutex;

use crate::config::parse_port_range;
use crate::error::OrchestratorError;

/// Which of the three port pools an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortRange {
    Host,
    Http,
    Https,
}

struct RangeAllocator {
    lo: u16,
    hi: u16,
    next: u16,
    used: HashSet<u16>,
}

impl RangeAllocator {
    fn new(lo: u16, hi: u16) -> Self {
        Self {
            lo,
            hi,
            next: lo,
            used: HashSet::new(),
        }
    }

    /// Probe from `next`, wrapping at `hi` back to `lo`; `avoid` is skipped
    /// without being marked used (for the HTTPS-avoid-HTTP-port case).
    fn alloc(&mut self, avoid: Option<u16>) -> Result<u16, OrchestratorError> {
        let span = (self.hi - self.lo) as u32 + 1;
        let mut p = self.next;
        for _ in 0..span {
            if p > self.hi {
                p = self.lo;
            }
            if Some(p) == avoid {
                p = p.saturating_add(1);
                continue;
            }
            if !self.used.contains(&p) {
                self.used.insert(p);
                self.next = p.saturating_add(1);
                return Ok(p);
            }
            p = p.saturating_add(1);
        }
        Err(OrchestratorError::NoFreePort)
    }

    fn reserve(&mut self, port: u16) {
        self.used.insert(port);
    }

    fn free(&mut self, port: u16) {
        self.used.remove(&port);
    }
}

pub struct PortAllocator {
    inner: Mutex<PortAllocatorInner>,
}

struct PortAllocatorInner {
    host: RangeAllocator,
    http: RangeAllocator,
    https: RangeAllocator,
}

impl PortAllocator {
    pub fn new(host_range: &str, http_range: &str, https_range: &str) -> anyhow::Result<Self> {
        let (h_lo, h_hi) = parse_port_range(host_range)?;
        let (hp_lo, hp_hi) = parse_port_range(http_range)?;
        let (hs_lo, hs_hi) = parse_port_range(https_range)?;
        Ok(Self {
            inner: Mutex::new(PortAllocatorInner {
                host: RangeAllocator::new(h_lo, h_hi),
                http: RangeAllocator::new(hp_lo, hp_hi),
                https: RangeAllocator::new(hs_lo, hs_hi),
            }),
        })
    }

    pub fn alloc(&self, range: PortRange) -> Result<u16, OrchestratorError> {
        let mut inner = self.inner.lock();
        Self::allocator_mut(&mut inner, range).alloc(None)
    }

    /// Same as `alloc`, but skips `avoid` if it equals the probed candidate.
    /// Only meaningful for the HTTPS range, to avoid colliding with the
    /// container's own HTTP port.
    pub fn alloc_https_avoiding(&self, avoid: u16) -> Result<u16, OrchestratorError> {
        let mut inner = self.inner.lock();
        inner.https.alloc(Some(avoid))
    }

    pub fn reserve(&self, range: PortRange, port: u16) {
        let mut inner = self.inner.lock();
        Self::allocator_mut(&mut inner, range).reserve(port);
    }

    pub fn free(&self, range: PortRange, port: Option<u16>) {
        let Some(port) = port else { return };
        let mut inner = self.inner.lock();
        Self::allocator_mut(&mut inner, range).free(port);
    }

    fn allocator_mut(inner: &mut PortAllocatorInner, range: PortRange) -> &mut RangeAllocator {
        match range {
            PortRange::Host => &mut inner.host,
            PortRange::Http => &mut inner.http,
            PortRange::Https => &mut inner.https,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocator() -> PortAllocator {
        PortAllocator::new("19000-19002", "40000-40001", "45000-45001").unwrap()
    }

    #[test]
    fn alloc_returns_port_in_range_and_marks_used() {
        let a = allocator();
        let p = a.alloc(PortRange::Host).unwrap();
        assert!((19000..=19002).contains(&p));
    }

    #[test]
    fn free_allows_reuse_and_double_free_is_noop() {
        let a = allocator();
        let p = a.alloc(PortRange::Http).unwrap();
        a.free(PortRange::Http, Some(p));
        a.free(PortRange::Http, Some(p));
        let p2 = a.alloc(PortRange::Http).unwrap();
        assert_eq!(p, p2);
    }

    #[test]
    fn exhausted_range_fails_with_no_free_port() {
        let a = allocator();
        // 40000-40001 => 2 ports total
        a.alloc(PortRange::Http).unwrap();
        a.alloc(PortRange::Http).unwrap();
        let err = a.alloc(PortRange::Http).unwrap_err();
        assert!(matches!(err, OrchestratorError::NoFreePort));
    }

    #[test]
    fn alloc_https_avoiding_skips_candidate_without_marking_used() {
        let a = allocator();
        // force next to land on 45000 then avoid it
        let p = a.alloc_https_avoiding(45000).unwrap();
        assert_eq!(p, 45001);
        // 45000 should remain free since it was skipped, not consumed
        a.reserve(PortRange::Https, 45001);
        a.free(PortRange::Https, Some(45001));
        let p2 = a.alloc(PortRange::Https).unwrap();
        assert_eq!(p2, 45000);
    }

    #[test]
    fn reserve_is_idempotent_and_does_not_move_cursor() {
        let a = allocator();
        a.reserve(PortRange::Host, 19000);
        a.reserve(PortRange::Host, 19000);
        let p = a.alloc(PortRange::Host).unwrap();
        assert_ne!(p, 19000);
    }

    #[test]
    fn never_returns_same_port_twice_between_alloc_and_free() {
        let a = allocator();
        let p1 = a.alloc(PortRange::Host).unwrap();
        let p2 = a.alloc(PortRange::Host).unwrap();
        assert_ne!(p1, p2);
    }
}
