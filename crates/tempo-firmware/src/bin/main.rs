#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use core::cell::RefCell;
use core::fmt::Display;

use critical_section::Mutex;
use embassy_executor::Spawner;
use embassy_time::{Duration, Instant, Ticker, Timer};
use embedded_hal_bus::spi::ExclusiveDevice;
use esp_hal::analog::adc::{Adc, AdcConfig, Attenuation};
use esp_hal::clock::CpuClock;
use esp_hal::delay::Delay;
use esp_hal::gpio::{Event, Input, InputConfig, Io, Level, Output, OutputConfig, Pull};
use esp_hal::handler;
use esp_hal::interrupt::Priority;
use esp_hal::interrupt::software::SoftwareInterruptControl;
use esp_hal::rtc_cntl::Rtc;
use esp_hal::spi::master::{Config as SpiConfig, Spi};
use esp_hal::time::Rate;
use esp_hal::timer::timg::TimerGroup;
use esp_hal::uart::{Config as UartConfig, Uart};
use esp_rtos::embassy::InterruptExecutor;
use esp_storage::FlashStorage;
use log::{error, info, warn};
use static_cell::StaticCell;

use tempo_core::config::{DEFAULT_SAMPLE_CAPACITY, LoggerConfig};
use tempo_core::device::{DeviceContext, Peripherals, SharedState};
use tempo_core::logging::{ClockTimeSource, LogStorage, SdCardStorage};
use tempo_core::time::NmeaReceiver;
use tempo_firmware::board::{
    AdcChannel, CardStorage, ChipRtc, Console, DetachedHost, EspBoard, FlashFlags, LedIndicator,
    SerialRx, SerialTx,
};

const CONFIG_FILE: &str = "TEMPO.CFG";
const GPS_BAUD: u32 = 9_600;
const CONSOLE_BAUD: u32 = 115_200;
const SYNC_BAUD: u32 = 115_200;

static SHARED: SharedState<DEFAULT_SAMPLE_CAPACITY> = SharedState::new();

/// The pulse input, owned by the edge interrupt once configured.
static PPS_PIN: Mutex<RefCell<Option<Input<'static>>>> = Mutex::new(RefCell::new(None));

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

/// Unrecoverable setup failure: report and stop.
fn halt(reason: impl Display) -> ! {
    error!("Halting: {}", reason);
    loop {}
}

#[handler]
fn on_pulse_edge() {
    SHARED.pps.on_edge(Instant::now().as_millis() as u32);
    critical_section::with(|cs| {
        if let Some(pin) = PPS_PIN.borrow_ref_mut(cs).as_mut() {
            pin.clear_interrupt();
        }
    });
}

#[embassy_executor::task]
async fn sampler(mut channel: AdcChannel, period: Duration) {
    let mut ticker = Ticker::every(period);
    loop {
        SHARED.samples.capture(&mut channel);
        ticker.next().await;
    }
}

/// Optional postcard-encoded overrides from the card root.
fn load_config(storage: &mut CardStorage) -> LoggerConfig {
    // A failure here is reported again, fatally, by the device boot.
    if storage.init().is_err() {
        return LoggerConfig::default();
    }

    let mut buf = [0u8; 64];
    match storage.read_file(CONFIG_FILE, &mut buf) {
        Ok(len) => match LoggerConfig::from_postcard(&buf[..len]) {
            Ok(config) => {
                info!("Loaded {}", CONFIG_FILE);
                config
            }
            Err(e) => {
                warn!("Ignoring {}: {}", CONFIG_FILE, e);
                LoggerConfig::default()
            }
        },
        Err(_) => {
            info!("No {} on card, using defaults", CONFIG_FILE);
            LoggerConfig::default()
        }
    }
}

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(_spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("Embassy initialized!");

    // Serial ports
    let uart_config = |baud: u32| UartConfig::default().with_baudrate(baud);
    let (gps_rx, _gps_tx) = Uart::new(peripherals.UART1, uart_config(GPS_BAUD))
        .unwrap_or_else(|_| halt("satellite UART config"))
        .with_rx(peripherals.GPIO18)
        .with_tx(peripherals.GPIO17)
        .split();
    let (console_rx, console_tx) = Uart::new(peripherals.UART0, uart_config(CONSOLE_BAUD))
        .unwrap_or_else(|_| halt("console UART config"))
        .with_rx(peripherals.GPIO44)
        .with_tx(peripherals.GPIO43)
        .split();
    let (_sync_rx, sync_tx) = Uart::new(peripherals.UART2, uart_config(SYNC_BAUD))
        .unwrap_or_else(|_| halt("sync UART config"))
        .with_tx(peripherals.GPIO21)
        .split();

    // SD card on SPI2, 400 kHz for card initialization
    let spi_bus = Spi::new(
        peripherals.SPI2,
        SpiConfig::default().with_frequency(Rate::from_khz(400)),
    )
    .unwrap_or_else(|_| halt("SD SPI config"))
    .with_sck(peripherals.GPIO36)
    .with_mosi(peripherals.GPIO35)
    .with_miso(peripherals.GPIO37);
    let cs = Output::new(peripherals.GPIO38, Level::High, OutputConfig::default());
    let sd_spi = ExclusiveDevice::new(spi_bus, cs, Delay::new())
        .unwrap_or_else(|_| halt("SD chip select"));
    let sd_card = embedded_sdmmc::SdCard::new(sd_spi, Delay::new());
    let mut storage = SdCardStorage::new(sd_card, ClockTimeSource::new(&SHARED.wall_clock));

    let logger_config = load_config(&mut storage);

    // Sampler: a timer task on a high-priority interrupt executor, so it
    // preempts the main tick like an interrupt would.
    let mut adc_config = AdcConfig::new();
    let adc_pin = adc_config.enable_pin(peripherals.GPIO1, Attenuation::_11dB);
    let channel = AdcChannel {
        adc: Adc::new(peripherals.ADC1, adc_config),
        pin: adc_pin,
    };
    static SAMPLER_EXECUTOR: StaticCell<InterruptExecutor<2>> = StaticCell::new();
    let sw_ints = SoftwareInterruptControl::new(peripherals.SW_INTERRUPT);
    let executor = SAMPLER_EXECUTOR.init(InterruptExecutor::new(sw_ints.software_interrupt2));
    let sampler_spawner = executor.start(Priority::Priority3);
    sampler_spawner.must_spawn(sampler(channel, logger_config.sample_period()));

    // Pulse-per-second edge interrupt
    let mut io = Io::new(peripherals.IO_MUX);
    io.set_interrupt_handler(on_pulse_edge);
    let mut pps = Input::new(
        peripherals.GPIO4,
        InputConfig::default().with_pull(Pull::Down),
    );
    critical_section::with(|cs| {
        pps.listen(Event::RisingEdge);
        PPS_PIN.borrow_ref_mut(cs).replace(pps);
    });

    let led = Output::new(peripherals.GPIO2, Level::Low, OutputConfig::default());

    let board = Peripherals::<EspBoard> {
        gps: NmeaReceiver::new(),
        gps_port: SerialRx(gps_rx),
        console: Console {
            rx: SerialRx(console_rx),
            tx: SerialTx(console_tx),
        },
        sync_port: SerialTx(sync_tx),
        rtc: ChipRtc(Rtc::new(peripherals.LPWR)),
        storage,
        flags: FlashFlags(FlashStorage::new(peripherals.FLASH)),
        indicator: LedIndicator::new(led),
        host: DetachedHost,
    };

    let mut device = match DeviceContext::boot(board, &SHARED, logger_config, Instant::now()) {
        Ok(device) => device,
        Err(e) => halt(e),
    };

    loop {
        device.tick(Instant::now());
        // Yield so lower-priority embassy work can run.
        Timer::after(Duration::from_millis(1)).await;
    }
}
