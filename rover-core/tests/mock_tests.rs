use core::cell::RefCell;

use critical_section as _;
use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, NoopRawMutex};
use embedded_hal_mock::eh1::pwm::{Mock as PwmMock, Transaction as PwmTrans};
use rover_core::utils::{
    command::{PidConfig, RoverCommand, RoverError, SpeedCommand, TankCommand},
    controllers::{
        CommandBus, CommandQueue, DriveWheel, HBridgeWheel, MotorController, RoverController,
        SUCCESS,
    },
};

/// Records every actuation call made on it.
#[derive(Debug, Default)]
struct RecordingWheel {
    calls: Vec<WheelCall>,
    count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum WheelCall {
    Power(bool, u8),
    Speed(bool, f32, PidConfig),
}

impl RecordingWheel {
    fn last(&self) -> Option<WheelCall> {
        self.calls.last().copied()
    }
}

impl DriveWheel for RecordingWheel {
    type Error = core::convert::Infallible;

    fn set_power(
        &mut self,
        forward: bool,
        power: u8,
    ) -> Result<(), Self::Error> {
        self.calls.push(WheelCall::Power(forward, power));
        Ok(())
    }

    fn set_speed(
        &mut self,
        forward: bool,
        speed: f32,
        gains: &PidConfig,
    ) -> Result<(), Self::Error> {
        self.calls.push(WheelCall::Speed(forward, speed, *gains));
        Ok(())
    }

    fn read_encoder_count(&mut self) -> u32 {
        self.count
    }
}

type TestBus = CommandBus<NoopRawMutex, 4>;

fn tank(value: f32) -> TankCommand {
    TankCommand::new(
        false,
        SpeedCommand::new(true, value),
        SpeedCommand::new(true, value),
    )
}

#[test]
fn turtle_text_reaches_the_wheels() {
    let bus = TestBus::new();
    let left = RefCell::new(RecordingWheel::default());
    let right = RefCell::new(RecordingWheel::default());
    let mut rover = RoverController::new(&bus);
    rover.motors.attach(&left, &right);

    let result = bus.submit_tank_command("left,100");
    assert_eq!(result.status, SUCCESS);
    assert_eq!(result.id, None);

    let executed = rover.poll().expect("a command should execute");
    assert!(!executed.left.forward);
    assert_eq!(left.borrow().last(), Some(WheelCall::Power(false, 100)));
    assert_eq!(right.borrow().last(), Some(WheelCall::Power(true, 100)));
    assert_eq!(rover.poll(), None);
}

#[test]
fn one_command_per_poll_in_order() {
    let bus = TestBus::new();
    let left = RefCell::new(RecordingWheel::default());
    let right = RefCell::new(RecordingWheel::default());
    let mut rover = RoverController::new(&bus);
    rover.motors.attach(&left, &right);

    for speed in ["10", "20", "30"] {
        bus.submit_turtle_command(Some("forward"), Some(speed)).unwrap();
    }
    for expected in [10, 20, 30] {
        rover.poll();
        assert_eq!(left.borrow().last(), Some(WheelCall::Power(true, expected)));
    }
}

#[test]
fn full_queue_nacks_and_keeps_contents() {
    let bus = TestBus::new();
    for v in 1..=4 {
        bus.submit(RoverCommand::Tank(tank(v as f32))).unwrap();
    }

    let result = bus.submit_tank_command("forward,200");
    assert_eq!(result.status, RoverError::QueueFull.status());
    assert_eq!(
        bus.submit_turtle_command(Some("reverse"), Some("5")),
        Err(RoverError::QueueFull)
    );

    for v in 1..=4 {
        assert_eq!(bus.dequeue_next_command(), Ok(tank(v as f32)));
    }
    assert_eq!(bus.dequeue_next_command(), Err(RoverError::QueueEmpty));
}

#[test]
fn bad_and_malformed_text_have_distinct_status() {
    let bus = TestBus::new();
    assert_eq!(bus.submit_tank_command("").status, -1);
    assert_eq!(bus.submit_tank_command("sideways,1").status, -1);
    assert_eq!(bus.submit_tank_command("cmd(1,tank(true))").status, -2);
    assert!(bus.queue().is_empty());
}

#[test]
fn wrapped_command_reports_its_id() {
    let bus = TestBus::new();
    let result = bus.submit_tank_command("cmd(42,tank(false,true,255,false,0))");
    assert!(result.is_success());
    assert_eq!(result.id, Some(42));
    assert!(matches!(result.command, RoverCommand::Tank(_)));
    assert_eq!(bus.queue().len(), 1);
}

#[test]
fn halt_drains_queue_and_stops_wheels() {
    let bus = TestBus::new();
    let left = RefCell::new(RecordingWheel::default());
    let right = RefCell::new(RecordingWheel::default());
    let mut rover = RoverController::new(&bus);
    rover.motors.attach(&left, &right);

    bus.submit_tank_command("forward,120");
    rover.poll();
    assert_eq!(rover.motors.left_state().value, 120.0);

    bus.submit_tank_command("forward,50");
    bus.submit_tank_command("reverse,50");
    assert_eq!(bus.submit_tank_command("stop,0").status, SUCCESS);

    assert_eq!(rover.poll(), None);
    assert!(bus.queue().is_empty());
    assert_eq!(bus.dequeue_next_command(), Err(RoverError::QueueEmpty));
    assert!(rover.motors.left_state().is_stopped());
    assert!(rover.motors.right_state().is_stopped());
    assert_eq!(left.borrow().last(), Some(WheelCall::Power(true, 0)));
    assert_eq!(right.borrow().last(), Some(WheelCall::Power(true, 0)));

    // nothing queued before the halt resumes
    assert_eq!(rover.poll(), None);
    assert_eq!(left.borrow().calls.len(), 2);
}

#[test]
fn commands_accepted_after_halt_still_run() {
    let bus = TestBus::new();
    let left = RefCell::new(RecordingWheel::default());
    let right = RefCell::new(RecordingWheel::default());
    let mut rover = RoverController::new(&bus);
    rover.motors.attach(&left, &right);

    bus.submit_tank_command("reverse,60");
    assert_eq!(bus.submit_tank_command("stop,0").status, SUCCESS);
    assert_eq!(bus.submit_tank_command("forward,100").status, SUCCESS);
    assert_eq!(bus.queue().len(), 1);

    let executed = rover.poll().expect("forward should survive the halt");
    assert!(executed.left.forward);
    assert_eq!(
        left.borrow().calls,
        vec![WheelCall::Power(true, 0), WheelCall::Power(true, 100)]
    );
    assert_eq!(rover.motors.left_state().value, 100.0);
    assert_eq!(rover.poll(), None);
}

#[test]
fn halt_while_detached_only_clears_queue() {
    let queue: CommandQueue<NoopRawMutex, 4> = CommandQueue::new();
    let mut motors: MotorController<'_, RecordingWheel, _, 4> = MotorController::new(&queue);
    queue.enqueue(tank(1.0)).unwrap();
    queue.enqueue(tank(2.0)).unwrap();

    motors.halt();
    assert!(queue.is_empty());
    assert!(!motors.attached());
}

#[test]
fn detached_controller_drops_commands() {
    let bus = TestBus::new();
    let left = RefCell::new(RecordingWheel::default());
    let right = RefCell::new(RecordingWheel::default());
    let mut rover = RoverController::new(&bus);
    rover.motors.attach(&left, &right).detach();

    bus.submit_tank_command("forward,10");
    assert_eq!(rover.poll(), None);
    assert!(bus.queue().is_empty());
    assert!(left.borrow().calls.is_empty());
    assert_eq!(
        rover.motors.execute(&tank(10.0)),
        Err(RoverError::NotAttached)
    );
    assert!(rover.motors.left_state().is_stopped());
}

#[test]
fn attach_rebinds_to_new_wheels() {
    let queue: CommandQueue<NoopRawMutex, 4> = CommandQueue::new();
    let (a_left, a_right) = (RefCell::default(), RefCell::default());
    let (b_left, b_right) = (
        RefCell::new(RecordingWheel::default()),
        RefCell::new(RecordingWheel::default()),
    );
    let mut motors = MotorController::new(&queue);
    motors.attach(&a_left, &a_right);
    motors.attach(&b_left, &b_right);

    motors.execute(&tank(7.0)).unwrap();
    assert!(a_left.borrow().calls.is_empty());
    assert_eq!(b_left.borrow().last(), Some(WheelCall::Power(true, 7)));
}

#[test]
fn gains_apply_to_next_closed_loop_command() {
    let bus = TestBus::new();
    let left = RefCell::new(RecordingWheel::default());
    let right = RefCell::new(RecordingWheel::default());
    let mut rover = RoverController::new(&bus);
    rover.motors.attach(&left, &right);

    let gains = PidConfig::new(150.0, 1.5, 0.2, 0.05);
    assert!(bus.submit_tank_command("cmd(1,pid(150,1.5,0.2,0.05))").is_success());
    assert!(bus.submit_tank_command("cmd(2,tank(true,true,90,false,45))").is_success());

    rover.poll();
    assert_eq!(rover.motors.speed_control().gains(), gains);
    assert_eq!(left.borrow().last(), Some(WheelCall::Speed(true, 90.0, gains)));
    assert_eq!(right.borrow().last(), Some(WheelCall::Speed(false, 45.0, gains)));
    assert!(rover.motors.left_state().closed_loop);

    // open loop afterwards disables closed-loop control again
    bus.submit_tank_command("forward,30");
    rover.poll();
    assert!(!rover.motors.left_state().closed_loop);
}

#[test]
fn noop_has_no_effect() {
    let bus = TestBus::new();
    assert!(bus.submit_tank_command("cmd(9,noop())").is_success());
    assert!(bus.queue().is_empty());
    assert!(!bus.take_halt());
    assert_eq!(bus.take_gains(), None);
}

#[test]
fn encoder_changes_are_logged_once() {
    let queue: CommandQueue<NoopRawMutex, 4> = CommandQueue::new();
    let left = RefCell::new(RecordingWheel::default());
    let right = RefCell::new(RecordingWheel::default());
    let mut motors = MotorController::new(&queue);
    assert_eq!(motors.read_left_wheel_encoder(), None);
    motors.attach(&left, &right);

    left.borrow_mut().count = 12;
    let first = motors.log_wheel_encoders();
    assert_eq!(first.left, Some(12));
    assert_eq!(first.right, Some(0));
    assert!(motors.log_wheel_encoders().is_empty());

    right.borrow_mut().count = 3;
    let changes = motors.log_wheel_encoders();
    assert_eq!(changes.left, None);
    assert_eq!(changes.right, Some(3));
    assert_eq!(motors.read_right_wheel_encoder(), Some(3));
}

#[test]
fn hbridge_open_loop_drives_one_input() {
    let forward_pin = PwmMock::new(&[
        PwmTrans::set_duty_cycle(0),
        PwmTrans::max_duty_cycle(4095),
        PwmTrans::set_duty_cycle(4095),
    ]);
    let reverse_pin = PwmMock::new(&[
        PwmTrans::max_duty_cycle(4095),
        PwmTrans::set_duty_cycle(2039),
        PwmTrans::set_duty_cycle(0),
    ]);

    let mut wheel = HBridgeWheel::new(forward_pin, reverse_pin, 0.02).unwrap();
    wheel.set_power(false, 127).unwrap();
    wheel.set_power(true, 255).unwrap();
    assert!(!wheel.is_closed_loop());

    let (mut forward_pin, mut reverse_pin) = wheel.release();
    forward_pin.done();
    reverse_pin.done();
}

#[test]
fn hbridge_closed_loop_trims_duty() {
    let gains = PidConfig::new(100.0, 1.0, 0.0, 0.0);
    let forward_pin = PwmMock::new(&[
        // set_speed(50) feeds forward 127
        PwmTrans::max_duty_cycle(255),
        PwmTrans::set_duty_cycle(127),
        // measured 40: 127.5 + 10
        PwmTrans::max_duty_cycle(255),
        PwmTrans::set_duty_cycle(137),
    ]);
    let reverse_pin = PwmMock::new(&[
        PwmTrans::set_duty_cycle(0),
        PwmTrans::set_duty_cycle(0),
    ]);

    let mut wheel = HBridgeWheel::new(forward_pin, reverse_pin, 0.02).unwrap();
    wheel.set_speed(true, 50.0, &gains).unwrap();
    assert!(wheel.is_closed_loop());
    wheel.regulate_to_measured(40.0).unwrap();

    wheel.add_encoder_ticks(5);
    wheel.add_encoder_ticks(7);
    assert_eq!(wheel.read_encoder_count(), 12);

    let (mut forward_pin, mut reverse_pin) = wheel.release();
    forward_pin.done();
    reverse_pin.done();
}

#[test]
fn hbridge_regulates_from_encoder_ticks() {
    let gains = PidConfig::new(100.0, 1.0, 0.0, 0.0);
    let forward_pin = PwmMock::new(&[
        PwmTrans::max_duty_cycle(255),
        PwmTrans::set_duty_cycle(127),
        // 10 ticks over 0.5s = 20/s, error 30: 127.5 + 30
        PwmTrans::max_duty_cycle(255),
        PwmTrans::set_duty_cycle(157),
    ]);
    let reverse_pin = PwmMock::new(&[
        PwmTrans::set_duty_cycle(0),
        PwmTrans::set_duty_cycle(0),
    ]);

    let mut wheel = HBridgeWheel::new(forward_pin, reverse_pin, 0.5).unwrap();
    wheel.add_encoder_ticks(3);
    wheel.set_speed(true, 50.0, &gains).unwrap();
    wheel.add_encoder_ticks(10);
    wheel.regulate().unwrap();

    let (mut forward_pin, mut reverse_pin) = wheel.release();
    forward_pin.done();
    reverse_pin.done();
}

#[test]
fn hbridge_rejects_non_positive_period() {
    let mut forward_pin = PwmMock::new(&[]);
    let mut reverse_pin = PwmMock::new(&[]);
    let result = HBridgeWheel::new(forward_pin.clone(), reverse_pin.clone(), 0.0);
    assert!(matches!(result, Err(RoverError::BadInput)));
    forward_pin.done();
    reverse_pin.done();
}

#[test]
fn queue_handoff_across_threads_preserves_order() {
    const TOTAL: u32 = 2_000;
    let queue: CommandQueue<CriticalSectionRawMutex, 4> = CommandQueue::new();

    std::thread::scope(|scope| {
        scope.spawn(|| {
            let mut next = 0;
            while next < TOTAL {
                match queue.enqueue(tank(next as f32)) {
                    Ok(()) => next += 1,
                    Err(RoverError::QueueFull) => std::thread::yield_now(),
                    Err(other) => panic!("unexpected enqueue error: {:?}", other),
                }
            }
        });

        let mut expected = 0;
        while expected < TOTAL {
            match queue.dequeue() {
                Ok(cmd) => {
                    assert_eq!(cmd.left.value, expected as f32);
                    expected += 1;
                }
                Err(RoverError::QueueEmpty) => std::thread::yield_now(),
                Err(other) => panic!("unexpected dequeue error: {:?}", other),
            }
            assert!(queue.len() <= queue.capacity());
        }
    });

    assert!(queue.is_empty());
}
