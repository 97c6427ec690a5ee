//! Typed sensor commands

use std::time::Duration;

use byteorder::{BigEndian, ByteOrder};
use tracing::{debug, info};

use fprust_core::constants::{CHAR_BUFFER_1, INDEX_PAGE_SLOTS};
use fprust_core::{ConfirmationCode, Opcode};
use fprust_transport::{Channel, FrameReader};
use fprust_types::{IndexTable, SearchMatch, SystemParameters};

use crate::config::{RetryPolicy, SensorConfig};
use crate::error::{Error, Result};
use crate::executor::{Executor, Reply};

/// AS608 sensor driver
///
/// One method per protocol command. Expected negative outcomes (no
/// finger, no match) are values; every other non-`Ok` confirmation is an
/// [`Error::Sensor`].
///
/// # Examples
///
/// ```no_run
/// use fprust::{Sensor, SensorConfig, SerialChannel};
///
/// #[tokio::main]
/// async fn main() -> fprust::Result<()> {
///     let config = SensorConfig::default();
///     let mut sensor = Sensor::new(Box::new(SerialChannel::new("/dev/ttyUSB0")), &config);
///
///     sensor.open().await?;
///     sensor.handshake().await?;
///     println!("{} templates stored", sensor.template_count().await?);
///
///     sensor.close().await?;
///     Ok(())
/// }
/// ```
pub struct Sensor {
    executor: Executor,
    command_timeout: Duration,
    slow_command_timeout: Duration,
    slow_command_retry: RetryPolicy,
    capacity: u16,
}

impl Sensor {
    /// Create a driver over `channel`
    pub fn new(channel: Box<dyn Channel>, config: &SensorConfig) -> Self {
        let reader = FrameReader::new()
            .with_read_slice(config.read_slice)
            .with_max_sync_attempts(config.max_sync_attempts);

        Self {
            executor: Executor::new(channel)
                .with_reader(reader)
                .with_address(config.address),
            command_timeout: config.command_timeout,
            slow_command_timeout: config.slow_command_timeout,
            slow_command_retry: config.slow_command_retry,
            capacity: config
                .capacity
                .unwrap_or(fprust_core::constants::DEFAULT_LIBRARY_SIZE),
        }
    }

    /// Open the channel
    pub async fn open(&mut self) -> Result<()> {
        info!("Opening sensor on {}...", self.executor.describe());
        self.executor.open().await
    }

    /// Close the channel
    pub async fn close(&mut self) -> Result<()> {
        info!("Closing sensor on {}", self.executor.describe());
        self.executor.close().await
    }

    /// Library capacity used for range checks and searches
    pub fn capacity(&self) -> u16 {
        self.capacity
    }

    /// Replace the library capacity
    pub fn set_capacity(&mut self, capacity: u16) {
        self.capacity = capacity;
    }

    async fn command(&mut self, opcode: Opcode, params: &[u8]) -> Result<Reply> {
        self.executor
            .execute(opcode, params, self.command_timeout)
            .await
    }

    async fn slow_command(&mut self, opcode: Opcode, params: &[u8]) -> Result<Reply> {
        self.executor
            .execute_with_retry(opcode, params, self.slow_command_timeout, self.slow_command_retry)
            .await
    }

    fn check_slot(&self, slot: u16) -> Result<()> {
        if slot >= self.capacity {
            return Err(fprust_core::Error::SlotOutOfRange {
                slot,
                capacity: self.capacity,
            }
            .into());
        }
        Ok(())
    }

    /// Liveness check
    pub async fn handshake(&mut self) -> Result<()> {
        self.command(Opcode::Handshake, &[])
            .await?
            .ok_for(Opcode::Handshake)?;
        debug!("Handshake ok");
        Ok(())
    }

    /// Verify the module password
    pub async fn verify_password(&mut self, password: u32) -> Result<()> {
        self.command(Opcode::VerifyPassword, &password.to_be_bytes())
            .await?
            .ok_for(Opcode::VerifyPassword)?;
        debug!("Password verified");
        Ok(())
    }

    /// Read the system parameter block
    pub async fn read_system_parameters(&mut self) -> Result<SystemParameters> {
        let reply = self
            .command(Opcode::ReadSysPara, &[])
            .await?
            .ok_for(Opcode::ReadSysPara)?;
        Ok(SystemParameters::parse(&reply.payload)?)
    }

    /// Capture an image; `false` when no finger is on the window
    pub async fn capture_image(&mut self) -> Result<bool> {
        let reply = self.command(Opcode::GetImage, &[]).await?;
        match reply.confirmation {
            ConfirmationCode::NoFinger => Ok(false),
            _ => reply.ok_for(Opcode::GetImage).map(|_| true),
        }
    }

    /// Extract features from the captured image into `buffer`
    pub async fn gen_char(&mut self, buffer: u8) -> Result<()> {
        self.slow_command(Opcode::GenChar, &[buffer])
            .await?
            .ok_for(Opcode::GenChar)?;
        Ok(())
    }

    /// Compare character buffers 1 and 2; `None` when they differ
    pub async fn match_buffers(&mut self) -> Result<Option<u16>> {
        let reply = self.command(Opcode::Match, &[]).await?;
        match reply.confirmation {
            ConfirmationCode::NoMatch => Ok(None),
            _ => {
                let reply = reply.ok_for(Opcode::Match)?;
                let score = reply.require_payload(Opcode::Match, 2)?;
                Ok(Some(BigEndian::read_u16(score)))
            }
        }
    }

    /// Merge character buffers 1 and 2 into a template
    pub async fn reg_model(&mut self) -> Result<()> {
        self.command(Opcode::RegModel, &[])
            .await?
            .ok_for(Opcode::RegModel)?;
        Ok(())
    }

    /// Store character buffer `buffer` into `slot`
    pub async fn store(&mut self, buffer: u8, slot: u16) -> Result<()> {
        self.check_slot(slot)?;

        let [hi, lo] = slot.to_be_bytes();
        let reply = self.command(Opcode::StoreChar, &[buffer, hi, lo]).await?;
        if reply.confirmation == ConfirmationCode::BadLocation {
            return Err(Error::BadLocation { slot });
        }
        reply.ok_for(Opcode::StoreChar)?;

        info!(slot, "Template stored");
        Ok(())
    }

    /// Search slots `start..start + count` with character buffer `buffer`
    pub async fn search(&mut self, buffer: u8, start: u16, count: u16) -> Result<Option<SearchMatch>> {
        let [start_hi, start_lo] = start.to_be_bytes();
        let [count_hi, count_lo] = count.to_be_bytes();

        let reply = self
            .slow_command(Opcode::Search, &[buffer, start_hi, start_lo, count_hi, count_lo])
            .await?;

        match reply.confirmation {
            ConfirmationCode::NotFound | ConfirmationCode::NoMatch => Ok(None),
            _ => {
                let reply = reply.ok_for(Opcode::Search)?;
                let payload = reply.require_payload(Opcode::Search, 4)?;
                Ok(Some(SearchMatch::parse(payload)?))
            }
        }
    }

    /// Search the whole library with character buffer 1
    pub async fn search_library(&mut self) -> Result<Option<SearchMatch>> {
        let capacity = self.capacity;
        self.search(CHAR_BUFFER_1, 0, capacity).await
    }

    /// Delete the template in `slot`
    pub async fn delete(&mut self, slot: u16) -> Result<()> {
        self.delete_range(slot, 1).await
    }

    /// Delete `count` templates starting at `start`
    pub async fn delete_range(&mut self, start: u16, count: u16) -> Result<()> {
        if count == 0 {
            return Err(fprust_core::Error::SlotOutOfRange {
                slot: start,
                capacity: self.capacity,
            }
            .into());
        }
        self.check_slot(start)?;
        self.check_slot(start.saturating_add(count - 1))?;

        let [start_hi, start_lo] = start.to_be_bytes();
        let [count_hi, count_lo] = count.to_be_bytes();

        let reply = self
            .command(Opcode::DeleteChar, &[start_hi, start_lo, count_hi, count_lo])
            .await?;
        if reply.confirmation == ConfirmationCode::BadLocation {
            return Err(Error::BadLocation { slot: start });
        }
        reply.ok_for(Opcode::DeleteChar)?;

        info!(start, count, "Templates deleted");
        Ok(())
    }

    /// Clear the whole library
    pub async fn empty_library(&mut self) -> Result<()> {
        self.command(Opcode::Empty, &[])
            .await?
            .ok_for(Opcode::Empty)?;

        info!("Library cleared");
        Ok(())
    }

    /// Number of stored templates
    ///
    /// Only authoritative right after a store, delete, or clear.
    pub async fn template_count(&mut self) -> Result<u16> {
        let reply = self
            .command(Opcode::TemplateCount, &[])
            .await?
            .ok_for(Opcode::TemplateCount)?;
        Ok(BigEndian::read_u16(
            reply.require_payload(Opcode::TemplateCount, 2)?,
        ))
    }

    /// Occupancy bitmap of library page `page`
    pub async fn read_index_table(&mut self, page: u8) -> Result<IndexTable> {
        let reply = self
            .command(Opcode::ReadIndexTable, &[page])
            .await?
            .ok_for(Opcode::ReadIndexTable)?;
        Ok(IndexTable::parse(page, &reply.payload)?)
    }

    /// Lowest slot the index table reports as free
    pub async fn find_free_slot(&mut self) -> Result<Option<u16>> {
        let pages = self.capacity.div_ceil(INDEX_PAGE_SLOTS);

        for page in 0..pages {
            let table = self.read_index_table(page as u8).await?;
            if let Some(slot) = table.first_free(self.capacity) {
                return Ok(Some(slot));
            }
        }
        Ok(None)
    }
}
