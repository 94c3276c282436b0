use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use core::cell::RefCell;

const PAGE_SIZE: u32 = 4096;

pub type SharedDdr = Rc<RefCell<Ddr>>;

/// Sparse model of the device view of DDR. Untouched memory reads as zero;
/// accesses outside `[base, base + len)` are bus errors.
pub struct Ddr {
    base: u32,
    len: u32,
    pages: BTreeMap<u32, Box<[u8; PAGE_SIZE as usize]>>,
}

impl Ddr {
    pub fn new(base: u32, len: u32) -> Self {
        Self { base, len, pages: BTreeMap::new() }
    }

    pub fn shared(base: u32, len: u32) -> SharedDdr {
        Rc::new(RefCell::new(Self::new(base, len)))
    }

    #[inline(always)]
    pub fn contains(&self, addr: u32, len: usize) -> bool {
        let end = addr as u64 + len as u64;
        addr >= self.base && end <= self.base as u64 + self.len as u64
    }

    /// Copy memory at `addr` into `out`. `false` on a bus error, in which
    /// case `out` is untouched.
    pub fn read(&self, addr: u32, out: &mut [u8]) -> bool {
        if !self.contains(addr, out.len()) {
            return false;
        }
        let mut done = 0;
        while done < out.len() {
            let at = addr + done as u32;
            let (page, offset) = (at / PAGE_SIZE, (at % PAGE_SIZE) as usize);
            let n = (PAGE_SIZE as usize - offset).min(out.len() - done);
            match self.pages.get(&page) {
                Some(bytes) => out[done..done + n].copy_from_slice(&bytes[offset..offset + n]),
                None => out[done..done + n].fill(0),
            }
            done += n;
        }
        true
    }

    pub fn write(&mut self, addr: u32, data: &[u8]) -> bool {
        if !self.contains(addr, data.len()) {
            return false;
        }
        let mut done = 0;
        while done < data.len() {
            let at = addr + done as u32;
            let (page, offset) = (at / PAGE_SIZE, (at % PAGE_SIZE) as usize);
            let n = (PAGE_SIZE as usize - offset).min(data.len() - done);
            let bytes = self.pages.entry(page).or_insert_with(|| Box::new([0; PAGE_SIZE as usize]));
            bytes[offset..offset + n].copy_from_slice(&data[done..done + n]);
            done += n;
        }
        true
    }

    pub fn read_u32(&self, addr: u32) -> Option<u32> {
        let mut word = [0; 4];
        self.read(addr, &mut word).then(|| u32::from_le_bytes(word))
    }

    pub fn write_u32(&mut self, addr: u32, value: u32) -> bool {
        self.write(addr, &value.to_le_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_pages() {
        let mut ddr = Ddr::new(0x1000, 0x4000);
        let data: alloc::vec::Vec<u8> = (0..=255).cycle().take(5000).collect();
        assert!(ddr.write(0x1F00, &data));

        let mut back = alloc::vec![0u8; 5000];
        assert!(ddr.read(0x1F00, &mut back));
        assert_eq!(back, data);
        assert_eq!(ddr.read_u32(0x1000), Some(0));
    }

    #[test]
    fn outside_window_is_a_bus_error() {
        let mut ddr = Ddr::new(0x1000, 0x100);
        assert!(!ddr.write(0x10FE, &[1, 2, 3]));
        assert_eq!(ddr.read_u32(0x0FFC), None);
        assert!(ddr.write_u32(0x10FC, 7));
    }
}
