use super::{Address, Section};

/// Region with nothing behind it: reads float high and writes are dropped.
#[derive(Debug, Clone)]
pub struct OpenBus {
    name: String,
    start: Address,
    length: u16,
}

impl OpenBus {
    pub fn new(name: impl Into<String>, start: Address, length: u16) -> Self {
        Self {
            name: name.into(),
            start,
            length,
        }
    }
}

impl Section for OpenBus {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self) -> Address {
        self.start
    }

    fn length(&self) -> u16 {
        self.length
    }

    fn read(&self, _addr: Address) -> u8 {
        0xFF
    }

    fn write(&mut self, _addr: Address, _value: u8) {}
}
