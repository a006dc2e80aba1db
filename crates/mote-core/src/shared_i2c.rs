//! One async I2C bus, many drivers
//!
//! Each driver gets its own [`SharedI2c`] handle. The bus is locked for the
//! duration of a single call, so a multi-step exchange that has to be atomic
//! must go through [`I2c::transaction`].

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;
use embedded_hal_async::i2c::{ErrorType, I2c, Operation};

pub struct SharedI2c<'a, M: RawMutex, T> {
    bus: &'a Mutex<M, T>,
}

impl<'a, M: RawMutex, T> SharedI2c<'a, M, T> {
    #[inline]
    pub const fn new(bus: &'a Mutex<M, T>) -> Self {
        Self { bus }
    }
}

impl<M: RawMutex, T> Clone for SharedI2c<'_, M, T> {
    fn clone(&self) -> Self {
        Self { bus: self.bus }
    }
}

impl<M, T> ErrorType for SharedI2c<'_, M, T>
where
    M: RawMutex,
    T: ErrorType,
{
    type Error = T::Error;
}

impl<M, T> I2c for SharedI2c<'_, M, T>
where
    M: RawMutex,
    T: I2c,
{
    #[inline]
    async fn read(&mut self, address: u8, read: &mut [u8]) -> Result<(), Self::Error> {
        self.bus.lock().await.read(address, read).await
    }

    #[inline]
    async fn write(&mut self, address: u8, write: &[u8]) -> Result<(), Self::Error> {
        self.bus.lock().await.write(address, write).await
    }

    #[inline]
    async fn write_read(
        &mut self,
        address: u8,
        write: &[u8],
        read: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.bus.lock().await.write_read(address, write, read).await
    }

    #[inline]
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.bus.lock().await.transaction(address, operations).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockI2c;
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

    #[test]
    fn test_handles_share_one_bus() {
        let bus: Mutex<CriticalSectionRawMutex, MockI2c> = Mutex::new(MockI2c::answering(&[0x5A]));
        let mut sensor = SharedI2c::new(&bus);
        let mut display = sensor.clone();

        block_on(display.write(0x3C, &[0x00, 0xAF])).unwrap();
        let mut id = [0u8; 1];
        block_on(sensor.write_read(0x5A, &[0x20], &mut id)).unwrap();

        assert_eq!(id, [0x5A]);
        let bus = block_on(bus.lock());
        assert_eq!(
            bus.writes,
            vec![(0x3C, vec![0x00, 0xAF]), (0x5A, vec![0x20])]
        );
    }
}
