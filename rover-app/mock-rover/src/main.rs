use clap::Parser;
use core::cell::RefCell;
use critical_section as _;
use embassy_executor::{Executor, Spawner};
use embassy_net::{Config, Ipv4Address, Ipv4Cidr, Runner, StackResources};
use embassy_net_tuntap::TunTapDevice;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use heapless::Vec;
use rand_core::{OsRng, TryRngCore};
use rover_core::utils::{
    command::PidConfig,
    config::{COMMAND_QUEUE_CAPACITY, HTTP_PORT},
    controllers::{DriveWheel, RoverController, COMMAND_BUS},
    http,
};
use static_cell::StaticCell;
use std::convert::Infallible;
use tracing::{error, info};

type Rover = RoverController<'static, SimWheel, CriticalSectionRawMutex, COMMAND_QUEUE_CAPACITY>;

#[derive(Parser)]
#[clap(version = "1.0")]
struct Opts
{
    /// TAP device name
    #[clap(long, default_value = "tap0")]
    tap: String,
    /// use a static IP instead of DHCP
    #[clap(long)]
    static_ip: bool,
    /// HTTP port for `/rover` and the `/ws` command socket
    #[clap(long, default_value_t = HTTP_PORT)]
    port: u16,
    /// initial max speed for closed-loop control (gains stay zero until set)
    #[clap(long)]
    max_speed: Option<f32>,
}

/// Wheel that logs actuation and fakes encoder pulses from the last duty.
struct SimWheel
{
    name: &'static str,
    ticks_per_read: u32,
    count: u32,
}

impl SimWheel
{
    const fn new(name: &'static str) -> Self
    {
        Self {
            name,
            ticks_per_read: 0,
            count: 0,
        }
    }
}

impl DriveWheel for SimWheel
{
    type Error = Infallible;

    fn set_power(
        &mut self,
        forward: bool,
        power: u8,
    ) -> Result<(), Self::Error>
    {
        info!(wheel = self.name, forward, power, "set power");
        self.ticks_per_read = u32::from(power) / 16;
        Ok(())
    }

    fn set_speed(
        &mut self,
        forward: bool,
        speed: f32,
        gains: &PidConfig,
    ) -> Result<(), Self::Error>
    {
        info!(wheel = self.name, forward, speed, ?gains, "set speed");
        self.ticks_per_read = (speed / 16.0) as u32;
        Ok(())
    }

    fn read_encoder_count(&mut self) -> u32
    {
        self.count = self.count.wrapping_add(self.ticks_per_read);
        self.count
    }
}

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, TunTapDevice>) -> !
{
    runner.run().await
}

#[embassy_executor::task]
async fn control_task(mut rover: Rover) -> !
{
    rover.run().await
}

#[embassy_executor::task]
async fn main_task(spawner: Spawner)
{
    let opts: Opts = Opts::parse();

    // Simulated wheels, owned here and lent to the controller
    static LEFT_WHEEL: StaticCell<RefCell<SimWheel>> = StaticCell::new();
    static RIGHT_WHEEL: StaticCell<RefCell<SimWheel>> = StaticCell::new();
    let left = &*LEFT_WHEEL.init(RefCell::new(SimWheel::new("left")));
    let right = &*RIGHT_WHEEL.init(RefCell::new(SimWheel::new("right")));

    let mut rover: Rover = RoverController::new(&COMMAND_BUS);
    rover.motors.attach(left, right);
    if let Some(max_speed) = opts.max_speed {
        rover
            .motors
            .set_speed_control(PidConfig::new(max_speed, 0.0, 0.0, 0.0));
    }
    spawner.spawn(control_task(rover)).unwrap();

    // Initialize network
    let device = match TunTapDevice::new(&opts.tap) {
        Ok(device) => device,
        Err(e) => {
            error!("Failed to open TAP device {}: {:?}", opts.tap, e);
            return;
        }
    };
    let config = if opts.static_ip {
        Config::ipv4_static(embassy_net::StaticConfigV4 {
            address: Ipv4Cidr::new(Ipv4Address::new(192, 168, 69, 2), 24),
            dns_servers: Vec::new(),
            gateway: Some(Ipv4Address::new(192, 168, 69, 1)),
        })
    } else {
        Config::dhcpv4(Default::default())
    };
    let mut seed_buf = [0; 8];
    if let Err(e) = OsRng.try_fill_bytes(&mut seed_buf) {
        error!("Failed to seed network stack: {:?}", e);
        return;
    }
    let seed = u64::from_le_bytes(seed_buf);

    static RESOURCES: StaticCell<StackResources<3>> = StaticCell::new();
    let (stack, runner) = embassy_net::new(
        device,
        config,
        RESOURCES.init(StackResources::<3>::new()),
        seed,
    );
    spawner.spawn(net_task(runner)).unwrap();

    info!("Waiting for network configuration...");
    stack.wait_config_up().await;

    info!("Starting rover server on port {}", opts.port);
    http(0, opts.port, stack, None).await;
}

static EXECUTOR: StaticCell<Executor> = StaticCell::new();

fn main()
{
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    let executor = EXECUTOR.init(Executor::new());
    executor.run(|spawner| {
        spawner.spawn(main_task(spawner)).unwrap();
    });
}
