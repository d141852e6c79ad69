//! quaddeck firmware entry point (ESP32).
//!
//! Builds the hardware implementations of the core's trait seams,
//! spawns the network tasks on a high-priority executor, and drives
//! [`Device::tick`] on the fixed loop cadence.

#![no_std]
#![no_main]

use core::cell::RefCell;

use embassy_executor::Spawner;
use embassy_net::{Runner, StackResources};
use embassy_time::{Duration, Instant, Ticker};
use embedded_hal_bus::spi::{NoDelay, RefCellDevice};
use esp_backtrace as _;
use esp_hal::clock::CpuClock;
use esp_hal::delay::Delay;
use esp_hal::gpio::{Input, Level, Output, Pull};
use esp_hal::interrupt::software::SoftwareInterruptControl;
use esp_hal::interrupt::Priority;
use esp_hal::rmt::Rmt;
use esp_hal::rng::Rng;
use esp_hal::rtc_cntl::Rtc;
use esp_hal::spi::master::{Config as SpiConfig, Spi};
use esp_hal::spi::Mode;
use esp_hal::time::RateExtU32;
use esp_hal::timer::timg::TimerGroup;
use esp_hal_embassy::InterruptExecutor;
use esp_hal_smartled::{smartLedBuffer, SmartLedsAdapter};
use esp_println as _;
use esp_storage::FlashStorage;
use esp_wifi::wifi::{WifiDevice, WifiStaDevice};
use mipidsi::models::ST7735s;
use mipidsi::Builder;
use static_cell::StaticCell;

use quaddeck::config::{IMAGE_HEIGHT, IMAGE_WIDTH, LED_COUNT, SURFACE_COUNT, TICK_INTERVAL_MS};
use quaddeck::hw::net::{peer_task, NetShared, PeerPort, TcpAssetSource};
use quaddeck::hw::panels::GfxPanel;
use quaddeck::hw::settings::Settings;
use quaddeck::hw::store::FlashStore;
use quaddeck::hw::strip::Ws2812Strip;
use quaddeck::hw::watchdog::RtcWatchdog;
use quaddeck::hw::wifi::{wifi_task, WifiLink, WifiShared};
use quaddeck::hw::HwRng;
use quaddeck::tick::Device;

macro_rules! mk_static {
    ($t:ty, $val:expr) => {{
        static STATIC_CELL: StaticCell<$t> = StaticCell::new();
        STATIC_CELL.init($val)
    }};
}

static WIFI_SHARED: WifiShared = WifiShared::new();
static NET_SHARED: NetShared = NetShared::new();

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static, WifiStaDevice>>) {
    runner.run().await
}

#[esp_hal_embassy::main]
async fn main(_spawner: Spawner) {
    let peripherals = esp_hal::init(esp_hal::Config::default().with_cpu_clock(CpuClock::max()));
    esp_alloc::heap_allocator!(72 * 1024);

    let timg1 = TimerGroup::new(peripherals.TIMG1);
    esp_hal_embassy::init(timg1.timer0);

    defmt::info!("quaddeck {} booting", env!("CARGO_PKG_VERSION"));

    // ═══════════════════════════════════════════════════════════════════
    // Radio, network stack, settings
    // ═══════════════════════════════════════════════════════════════════

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let mut rng = Rng::new(peripherals.RNG);
    let wifi_init = mk_static!(
        esp_wifi::EspWifiController<'static>,
        esp_wifi::init(timg0.timer0, rng, peripherals.RADIO_CLK).unwrap()
    );
    let (wifi_device, controller) =
        esp_wifi::wifi::new_with_mode(wifi_init, peripherals.WIFI, WifiStaDevice).unwrap();

    let seed = (u64::from(rng.random()) << 32) | u64::from(rng.random());
    let (stack, runner) = embassy_net::new(
        wifi_device,
        embassy_net::Config::dhcpv4(Default::default()),
        mk_static!(StackResources<4>, StackResources::<4>::new()),
        seed,
    );

    let settings = Settings::load(&mut FlashStorage::new());
    let has_credentials = settings.is_some();
    let peer_ip = settings.as_ref().map(|s| s.peer_ip).unwrap_or([0; 4]);

    // Network work runs at interrupt priority so the tick loop (and
    // the bounded blocking asset download) never starves it.
    let sw_ints = SoftwareInterruptControl::new(peripherals.SW_INTERRUPT);
    let hi_executor = mk_static!(
        InterruptExecutor<1>,
        InterruptExecutor::new(sw_ints.software_interrupt1)
    );
    let hi_spawner = hi_executor.start(Priority::Priority2);
    hi_spawner.spawn(net_task(runner)).ok();
    hi_spawner
        .spawn(wifi_task(controller, &WIFI_SHARED, settings))
        .ok();
    hi_spawner.spawn(peer_task(stack, &NET_SHARED, peer_ip)).ok();

    let link = WifiLink::new(&WIFI_SHARED, has_credentials);
    let sock = PeerPort::new(&NET_SHARED);
    let source = TcpAssetSource::new(stack, peer_ip);

    // ═══════════════════════════════════════════════════════════════════
    // Displays, keys, strip, storage, watchdog
    // ═══════════════════════════════════════════════════════════════════

    let spi = Spi::new(
        peripherals.SPI2,
        SpiConfig::default()
            .with_frequency(26.MHz())
            .with_mode(Mode::_0),
    )
    .unwrap()
    .with_sck(peripherals.GPIO18)
    .with_mosi(peripherals.GPIO23);
    let spi_bus = mk_static!(RefCell<Spi<'static, esp_hal::Blocking>>, RefCell::new(spi));

    let mut delay = Delay::new();
    let panel = |cs: Output<'static>, dc: Output<'static>, delay: &mut Delay| {
        let dev = RefCellDevice::new(spi_bus, cs, NoDelay).unwrap();
        let di = display_interface_spi::SPIInterface::new(dev, dc);
        let display = Builder::new(ST7735s, di)
            .display_size(IMAGE_WIDTH as u16, IMAGE_HEIGHT as u16)
            .init(delay)
            .unwrap();
        GfxPanel::new(display)
    };
    let panels = [
        panel(
            Output::new(peripherals.GPIO5, Level::High),
            Output::new(peripherals.GPIO2, Level::Low),
            &mut delay,
        ),
        panel(
            Output::new(peripherals.GPIO17, Level::High),
            Output::new(peripherals.GPIO15, Level::Low),
            &mut delay,
        ),
        panel(
            Output::new(peripherals.GPIO16, Level::High),
            Output::new(peripherals.GPIO13, Level::Low),
            &mut delay,
        ),
        panel(
            Output::new(peripherals.GPIO4, Level::High),
            Output::new(peripherals.GPIO12, Level::Low),
            &mut delay,
        ),
    ];

    // Keys are active low with external pull-ups on the board.
    let keys = [
        Input::new(peripherals.GPIO32, Pull::Up),
        Input::new(peripherals.GPIO33, Pull::Up),
        Input::new(peripherals.GPIO25, Pull::Up),
        Input::new(peripherals.GPIO26, Pull::Up),
    ];

    let rmt = Rmt::new(peripherals.RMT, 80.MHz()).unwrap();
    let strip = Ws2812Strip::new(SmartLedsAdapter::new(
        rmt.channel0,
        peripherals.GPIO27,
        smartLedBuffer!(LED_COUNT),
    ));

    let store = FlashStore::mount(FlashStorage::new());
    let watchdog = RtcWatchdog::new(Rtc::new(peripherals.LPWR));

    // ═══════════════════════════════════════════════════════════════════
    // Event loop
    // ═══════════════════════════════════════════════════════════════════

    let mut device = Device::new(
        panels,
        store,
        source,
        link,
        sock,
        strip,
        watchdog,
        HwRng::new(rng),
    );

    defmt::info!("entering tick loop");
    let mut ticker = Ticker::every(Duration::from_millis(TICK_INTERVAL_MS));
    loop {
        ticker.next().await;
        let mut raw = [false; SURFACE_COUNT];
        for (level, key) in raw.iter_mut().zip(keys.iter()) {
            *level = key.is_low();
        }
        device.tick(Instant::now().as_millis(), raw);
    }
}
