//! ESP32-S3 implementations of the logger's peripheral traits.
//!
//! Pin map (see `bin/main.rs`):
//!
//! | Function          | Peripheral | Pins                          |
//! |-------------------|------------|-------------------------------|
//! | console           | UART0      | TX 43, RX 44                  |
//! | satellite rx      | UART1      | TX 17, RX 18                  |
//! | sync out          | UART2      | TX 21                         |
//! | pulse-per-second  | GPIO       | 4 (rising edge)               |
//! | analog input      | ADC1       | 1                             |
//! | SD card           | SPI2       | SCK 36, MOSI 35, MISO 37, CS 38 |
//! | status LED        | GPIO       | 2                             |

use embassy_time::{Duration, Instant};
use embedded_hal_bus::spi::ExclusiveDevice;
use embedded_io::{ErrorKind, ErrorType, Read, ReadReady, Write};
use embedded_storage::{ReadStorage, Storage};
use esp_hal::Blocking;
use esp_hal::analog::adc::{Adc, AdcPin};
use esp_hal::delay::Delay;
use esp_hal::gpio::Output;
use esp_hal::peripherals::{ADC1, GPIO1};
use esp_hal::rtc_cntl::Rtc;
use esp_hal::spi::master::Spi;
use esp_hal::uart::{UartRx, UartTx};
use esp_storage::FlashStorage;
use log::{info, warn};

use tempo_core::device::Board;
use tempo_core::logging::{ClockTimeSource, SdCardStorage};
use tempo_core::sampling::AnalogChannel;
use tempo_core::session::{FlagStore, HostTransfer, IndicatorPattern, StatusIndicator};
use tempo_core::time::{NmeaReceiver, RealTimeClock};

/// Flash offset of the flag bytes: the first sector of the `nvs` partition
/// in the default partition table.
pub const FLAG_REGION_OFFSET: u32 = 0x9000;

pub type SdSpi = ExclusiveDevice<Spi<'static, Blocking>, Output<'static>, Delay>;
pub type SdCard = embedded_sdmmc::SdCard<SdSpi, Delay>;
pub type CardStorage = SdCardStorage<SdCard, ClockTimeSource<'static>>;

// ---------------------------------------------------------------------------
// Serial ports
// ---------------------------------------------------------------------------

/// Receive half of a UART as a non-blocking `embedded_io` reader.
pub struct SerialRx(pub UartRx<'static, Blocking>);

impl ErrorType for SerialRx {
    type Error = ErrorKind;
}

impl ReadReady for SerialRx {
    fn read_ready(&mut self) -> Result<bool, ErrorKind> {
        Ok(self.0.read_ready())
    }
}

impl Read for SerialRx {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ErrorKind> {
        self.0.read_buffered(buf).map_err(|_| ErrorKind::Other)
    }
}

/// Transmit half of a UART.
pub struct SerialTx(pub UartTx<'static, Blocking>);

impl ErrorType for SerialTx {
    type Error = ErrorKind;
}

impl Write for SerialTx {
    fn write(&mut self, buf: &[u8]) -> Result<usize, ErrorKind> {
        self.0.write(buf).map_err(|_| ErrorKind::Other)
    }

    fn flush(&mut self) -> Result<(), ErrorKind> {
        self.0.flush().map_err(|_| ErrorKind::Other)
    }
}

/// Both halves of the console UART.
pub struct Console {
    pub rx: SerialRx,
    pub tx: SerialTx,
}

impl ErrorType for Console {
    type Error = ErrorKind;
}

impl ReadReady for Console {
    fn read_ready(&mut self) -> Result<bool, ErrorKind> {
        self.rx.read_ready()
    }
}

impl Read for Console {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ErrorKind> {
        self.rx.read(buf)
    }
}

impl Write for Console {
    fn write(&mut self, buf: &[u8]) -> Result<usize, ErrorKind> {
        self.tx.write(buf)
    }

    fn flush(&mut self) -> Result<(), ErrorKind> {
        self.tx.flush()
    }
}

// ---------------------------------------------------------------------------
// Clock, flag byte and analog input
// ---------------------------------------------------------------------------

/// The low-power RTC. It keeps counting through resets and deep sleep.
pub struct ChipRtc(pub Rtc<'static>);

impl RealTimeClock for ChipRtc {
    fn get(&mut self) -> u32 {
        (self.0.current_time_us() / 1_000_000).min(u32::MAX as u64) as u32
    }

    fn set(&mut self, epoch_secs: u32) {
        self.0.set_current_time_us(epoch_secs as u64 * 1_000_000);
    }
}

pub struct FlashFlags(pub FlashStorage<'static>);

impl FlagStore for FlashFlags {
    fn read(&mut self, address: u16) -> u8 {
        let mut byte = [0xFF];
        if let Err(e) = self.0.read(FLAG_REGION_OFFSET + address as u32, &mut byte) {
            warn!("Flag read failed: {:?}", e);
        }
        byte[0]
    }

    fn write(&mut self, address: u16, value: u8) {
        if let Err(e) = self.0.write(FLAG_REGION_OFFSET + address as u32, &[value]) {
            warn!("Flag write failed: {:?}", e);
        }
    }
}

pub struct AdcChannel {
    pub adc: Adc<'static, ADC1<'static>, Blocking>,
    pub pin: AdcPin<GPIO1<'static>, ADC1<'static>>,
}

impl AnalogChannel for AdcChannel {
    fn read(&mut self) -> u16 {
        // A oneshot conversion completes in a few microseconds.
        loop {
            if let Ok(raw) = self.adc.read_oneshot(&mut self.pin) {
                return raw;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Indicator and host transfer
// ---------------------------------------------------------------------------

pub struct LedIndicator {
    led: Output<'static>,
    pattern: IndicatorPattern,
    last_toggle: Instant,
}

impl LedIndicator {
    pub fn new(led: Output<'static>) -> Self {
        Self {
            led,
            pattern: IndicatorPattern::Default,
            last_toggle: Instant::from_ticks(0),
        }
    }
}

impl StatusIndicator for LedIndicator {
    fn set_pattern(&mut self, pattern: IndicatorPattern) {
        self.pattern = pattern;
    }

    fn service(&mut self, now: Instant) {
        let half_period = match self.pattern {
            IndicatorPattern::Default => Duration::from_millis(1000),
            IndicatorPattern::Fast => Duration::from_millis(100),
        };
        if now.saturating_duration_since(self.last_toggle) >= half_period {
            self.led.toggle();
            self.last_toggle = now;
        }
    }
}

/// This board exposes no USB mass-storage function; files are read by
/// removing the card.
pub struct DetachedHost;

impl HostTransfer for DetachedHost {
    fn service(&mut self) {}

    fn reset(&mut self) {
        info!("No host file transfer on this board");
    }
}

pub struct EspBoard;

impl Board for EspBoard {
    type Gps = NmeaReceiver;
    type GpsPort = SerialRx;
    type Console = Console;
    type SyncPort = SerialTx;
    type Rtc = ChipRtc;
    type Storage = CardStorage;
    type Flags = FlashFlags;
    type Indicator = LedIndicator;
    type Host = DetachedHost;
}
