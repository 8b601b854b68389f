//! Affinity - CPU affinity masks
//!
//! Controls which CPUs a thread can be queued on

/// CPU affinity mask (64 CPUs max)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CpuMask(u64);

impl CpuMask {
    /// Create empty mask
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Create mask allowing all CPUs
    pub const fn all() -> Self {
        Self(u64::MAX)
    }

    /// Mask of the first `nr_cpus` CPUs
    pub const fn online(nr_cpus: usize) -> Self {
        if nr_cpus >= 64 {
            Self(u64::MAX)
        } else {
            Self((1u64 << nr_cpus) - 1)
        }
    }

    /// Create mask for single CPU
    pub const fn single(cpu: usize) -> Self {
        Self(1 << (cpu & 63))
    }

    /// Raw bits
    pub const fn bits(&self) -> u64 {
        self.0
    }

    /// Set CPU bit
    pub fn set(&mut self, cpu: usize) {
        self.0 |= 1 << (cpu & 63);
    }

    /// Clear CPU bit
    pub fn clear(&mut self, cpu: usize) {
        self.0 &= !(1 << (cpu & 63));
    }

    /// Check if CPU is set
    pub fn is_set(&self, cpu: usize) -> bool {
        cpu < 64 && (self.0 & (1 << cpu)) != 0
    }

    /// Count set CPUs
    pub fn count(&self) -> u32 {
        self.0.count_ones()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Get first set CPU
    pub fn first(&self) -> Option<usize> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0.trailing_zeros() as usize)
        }
    }

    /// Intersect with another mask
    pub fn intersect(&self, other: &Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Union with another mask
    pub fn union(&self, other: &Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Iterate over set CPUs in ascending order
    pub fn iter(&self) -> impl Iterator<Item = usize> {
        let bits = self.0;
        (0..64).filter(move |cpu| bits & (1 << cpu) != 0)
    }
}

impl Default for CpuMask {
    fn default() -> Self {
        Self::all()
    }
}
