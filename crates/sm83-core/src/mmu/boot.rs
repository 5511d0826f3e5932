use super::{Access, Address, BootLatch, Section};

const BOOT_LEN: usize = 0x100;

/// Shadows the start of another section with the boot ROM until the
/// [`BootLatch`] is cleared.
pub struct BootRomOverlay<S> {
    boot: Vec<u8>,
    latch: BootLatch,
    inner: S,
}

impl<S: Section> BootRomOverlay<S> {
    /// Only the first 256 bytes of `boot` are mapped.
    pub fn new(mut boot: Vec<u8>, latch: BootLatch, inner: S) -> Self {
        boot.truncate(BOOT_LEN);
        Self { boot, latch, inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn shadowed(&self, addr: Address) -> Option<u8> {
        let off = usize::from(addr.checked_sub(self.inner.start())?);
        if off < self.boot.len() && self.latch.is_mapped() {
            Some(self.boot[off])
        } else {
            None
        }
    }
}

impl<S: Section> Section for BootRomOverlay<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn start(&self) -> Address {
        self.inner.start()
    }

    fn length(&self) -> u16 {
        self.inner.length()
    }

    fn access(&self) -> Access {
        self.inner.access()
    }

    fn access_at(&self, addr: Address) -> Access {
        self.inner.access_at(addr)
    }

    fn read(&self, addr: Address) -> u8 {
        self.shadowed(addr).unwrap_or_else(|| self.inner.read(addr))
    }

    // Writes still reach the cartridge controller while the boot ROM is
    // visible.
    fn write(&mut self, addr: Address, value: u8) {
        self.inner.write(addr, value);
    }
}
