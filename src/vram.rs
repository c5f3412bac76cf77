use std::collections::BTreeMap;

use crate::error::CoreError;

/// First-fit range allocator over one device's VRAM address space.
/// Allocated ranges never overlap, and a free must name the exact start
/// address of a prior allocation.
#[derive(Debug)]
pub struct VramAllocator {
    base: u64,
    size: u64,
    ranges: BTreeMap<u64, u64>,
}

impl VramAllocator {
    pub fn new(base: u64, size: u64) -> Self {
        Self {
            base,
            size,
            ranges: BTreeMap::new(),
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.size
    }

    pub fn used_bytes(&self) -> u64 {
        self.ranges.values().sum()
    }

    pub fn allocation_count(&self) -> usize {
        self.ranges.len()
    }

    pub fn alloc(&mut self, size: u64, alignment: u64) -> Result<u64, CoreError> {
        if size == 0 {
            return Err(CoreError::invalid("vram allocation size must be nonzero"));
        }
        if alignment == 0 || !alignment.is_power_of_two() {
            return Err(CoreError::invalid(format!(
                "vram alignment {alignment} must be a nonzero power of two"
            )));
        }

        let align_up = |addr: u64| addr.checked_add(alignment - 1).map(|a| a & !(alignment - 1));

        let mut candidate = match align_up(self.base) {
            Some(addr) => addr,
            None => {
                return Err(CoreError::OutOfMemory {
                    requested: size as usize,
                })
            }
        };
        for (start, len) in &self.ranges {
            let fits_before = candidate
                .checked_add(size)
                .map(|end| end <= *start)
                .unwrap_or(false);
            if fits_before {
                break;
            }
            candidate = match start.checked_add(*len).and_then(align_up) {
                Some(addr) => addr,
                None => {
                    return Err(CoreError::OutOfMemory {
                        requested: size as usize,
                    })
                }
            };
        }

        // a span reaching past the address space is clamped to its end
        let end = self.base.checked_add(self.size).unwrap_or(u64::MAX);
        if candidate.checked_add(size).map(|e| e > end).unwrap_or(true) {
            return Err(CoreError::OutOfMemory {
                requested: size as usize,
            });
        }

        self.ranges.insert(candidate, size);
        Ok(candidate)
    }

    pub fn free(&mut self, address: u64) -> Result<u64, CoreError> {
        self.ranges.remove(&address).ok_or_else(|| {
            CoreError::invalid(format!(
                "vram address {address:#x} does not match an allocation"
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_never_overlap() {
        let mut vram = VramAllocator::new(0x1000, 0x1000);
        let a = vram.alloc(0x100, 0x100).unwrap();
        let b = vram.alloc(0x100, 0x100).unwrap();
        let c = vram.alloc(0x80, 0x10).unwrap();

        let mut ranges = vec![(a, 0x100u64), (b, 0x100), (c, 0x80)];
        ranges.sort();
        for pair in ranges.windows(2) {
            assert!(pair[0].0 + pair[0].1 <= pair[1].0);
        }
    }

    #[test]
    fn freed_ranges_are_reusable() {
        let mut vram = VramAllocator::new(0, 0x400);
        let a = vram.alloc(0x200, 0x10).unwrap();
        let _b = vram.alloc(0x200, 0x10).unwrap();
        assert!(vram.alloc(0x10, 0x10).is_err());

        vram.free(a).unwrap();
        let again = vram.alloc(0x200, 0x10).unwrap();
        assert_eq!(again, a);
        assert_eq!(vram.used_bytes(), 0x400);
    }

    #[test]
    fn free_must_match_a_prior_allocation_start() {
        let mut vram = VramAllocator::new(0x1000, 0x1000);
        let addr = vram.alloc(0x100, 0x100).unwrap();

        assert!(matches!(
            vram.free(addr + 1),
            Err(CoreError::InvalidParameter { .. })
        ));
        vram.free(addr).unwrap();
        assert!(matches!(
            vram.free(addr),
            Err(CoreError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn alignment_is_honored() {
        let mut vram = VramAllocator::new(0x1001, 0x1000);
        let addr = vram.alloc(0x10, 0x100).unwrap();
        assert_eq!(addr % 0x100, 0);
        assert!(addr >= 0x1001);
    }

    #[test]
    fn invalid_alignment_is_rejected() {
        let mut vram = VramAllocator::new(0, 0x1000);
        assert!(vram.alloc(0x10, 0).is_err());
        assert!(vram.alloc(0x10, 3).is_err());
        assert!(vram.alloc(0, 0x10).is_err());
    }

    #[test]
    fn ranges_near_the_end_of_the_address_space_do_not_overflow() {
        let mut vram = VramAllocator::new(u64::MAX - 0xff, 0x100);
        let addr = vram.alloc(0x80, 1).unwrap();
        assert_eq!(addr, u64::MAX - 0xff);

        assert_eq!(
            vram.alloc(0x100, 1),
            Err(CoreError::OutOfMemory { requested: 0x100 })
        );
        let tail = vram.alloc(0x7f, 1).unwrap();
        assert_eq!(tail, addr + 0x80);
    }

    #[test]
    fn exhaustion_reports_out_of_memory() {
        let mut vram = VramAllocator::new(0, 0x100);
        vram.alloc(0x100, 1).unwrap();
        assert_eq!(
            vram.alloc(1, 1),
            Err(CoreError::OutOfMemory { requested: 1 })
        );
    }
}
