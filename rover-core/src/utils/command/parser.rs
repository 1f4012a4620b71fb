//! Text command parsing for the HTTP and WebSocket transports.
//!
//! Two forms are accepted:
//!
//! - turtle: `direction,speed` (or the `direction`/`speed` query pair), where
//!   `direction` is one of `stop`, `forward`, `reverse`, `left`, `right`;
//! - wrapped: `cmd<version>(<id>,<body>)` with `<body>` one of
//!   `tank(<speed_ctl>,<l_fwd>,<l_val>,<r_fwd>,<r_val>)`,
//!   `pid(<max_speed>,<kp>,<ki>,<kd>)`, `halt()` or `noop()`. The version
//!   digits may be omitted (`cmd(...)`), which means
//!   [`WRAPPED_GRAMMAR_VERSION`]; any other version is refused.
//!
//! Parsing never touches the queue or the controller.

use super::{PidConfig, RoverCommand, RoverError, SpeedCommand, TankCommand};
use crate::utils::config::{MAX_PWM, WRAPPED_GRAMMAR_VERSION};

const WRAPPED_KEYWORD: &str = "cmd";

/// A wrapped command together with the id the client tagged it with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WrappedCommand {
    pub id: u32,
    pub command: RoverCommand,
}

/// Parse either text form. Turtle text is always open loop.
pub fn parse(raw: &str) -> Result<RoverCommand, RoverError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(RoverError::BadInput);
    }
    if is_wrapped(raw) {
        return parse_wrapped(raw).map(|wrapped| wrapped.command);
    }

    match raw.split_once(',') {
        Some((direction, speed)) => parse_turtle(Some(direction), Some(speed), false),
        None => parse_turtle(Some(raw), None, false),
    }
}

/// Whether `raw` uses the `cmd(...)` / `cmd<version>(...)` envelope.
pub fn is_wrapped(raw: &str) -> bool {
    raw.trim_start()
        .strip_prefix(WRAPPED_KEYWORD)
        .is_some_and(|rest| {
            rest.trim_start_matches(|c: char| c.is_ascii_digit())
                .starts_with('(')
        })
}

/// Translate a direction/speed pair into a command.
///
/// `stop` yields [`RoverCommand::Halt`] whatever the speed. Open-loop speeds
/// must lie in `0..=255`; closed-loop speeds only need to be non-negative.
pub fn parse_turtle(
    direction: Option<&str>,
    speed: Option<&str>,
    use_speed_control: bool,
) -> Result<RoverCommand, RoverError> {
    let direction = direction.map(str::trim).ok_or(RoverError::BadInput)?;
    if direction == "stop" {
        return Ok(RoverCommand::Halt);
    }

    let (left_forward, right_forward) = match direction {
        "forward" => (true, true),
        "reverse" => (false, false),
        "left" => (false, true),
        "right" => (true, false),
        _ => return Err(RoverError::BadInput),
    };

    let speed = parse_speed(speed.ok_or(RoverError::BadInput)?)?;
    if !use_speed_control && speed > u32::from(MAX_PWM) {
        return Err(RoverError::BadInput);
    }
    let value = speed as f32;

    Ok(RoverCommand::Tank(TankCommand::new(
        use_speed_control,
        SpeedCommand::new(left_forward, value),
        SpeedCommand::new(right_forward, value),
    )))
}

/// Digits only; signs, blanks and overflow are rejected.
fn parse_speed(raw: &str) -> Result<u32, RoverError> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RoverError::BadInput);
    }
    raw.parse().map_err(|_| RoverError::BadInput)
}

/// Parse a `cmd<version>(<id>,<body>)` envelope.
pub fn parse_wrapped(raw: &str) -> Result<WrappedCommand, RoverError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(RoverError::BadInput);
    }

    let (version, rest) = raw
        .strip_prefix(WRAPPED_KEYWORD)
        .and_then(|rest| rest.split_once('('))
        .ok_or(RoverError::ParseFailure)?;
    if !version.is_empty() && version.parse::<u8>() != Ok(WRAPPED_GRAMMAR_VERSION) {
        return Err(RoverError::ParseFailure);
    }
    let inner = rest.strip_suffix(')').ok_or(RoverError::ParseFailure)?;
    let (id, body) = inner.split_once(',').ok_or(RoverError::ParseFailure)?;
    let id = id.trim().parse::<u32>().map_err(|_| RoverError::ParseFailure)?;

    let (tag, args) = body.trim().split_once('(').ok_or(RoverError::ParseFailure)?;
    let args = args.strip_suffix(')').ok_or(RoverError::ParseFailure)?;

    let command = match tag.trim() {
        "tank" => RoverCommand::Tank(parse_tank_body(args)?),
        "pid" => RoverCommand::Pid(parse_pid_body(args)?),
        "halt" if args.trim().is_empty() => RoverCommand::Halt,
        "noop" if args.trim().is_empty() => RoverCommand::Noop,
        _ => return Err(RoverError::ParseFailure),
    };

    Ok(WrappedCommand { id, command })
}

fn parse_tank_body(args: &str) -> Result<TankCommand, RoverError> {
    let [speed_ctl, l_fwd, l_val, r_fwd, r_val] = fields::<5>(args)?;
    let use_speed_control = parse_bool(speed_ctl)?;

    let magnitude = |raw: &str| -> Result<f32, RoverError> {
        let value = parse_real(raw)?;
        if value < 0.0 || (!use_speed_control && value > f32::from(MAX_PWM)) {
            return Err(RoverError::ParseFailure);
        }
        Ok(value)
    };

    Ok(TankCommand::new(
        use_speed_control,
        SpeedCommand::new(parse_bool(l_fwd)?, magnitude(l_val)?),
        SpeedCommand::new(parse_bool(r_fwd)?, magnitude(r_val)?),
    ))
}

fn parse_pid_body(args: &str) -> Result<PidConfig, RoverError> {
    let [max_speed, kp, ki, kd] = fields::<4>(args)?;
    let max_speed = parse_real(max_speed)?;
    if max_speed < 0.0 {
        return Err(RoverError::ParseFailure);
    }
    Ok(PidConfig::new(
        max_speed,
        parse_real(kp)?,
        parse_real(ki)?,
        parse_real(kd)?,
    ))
}

/// Split `args` on commas into exactly `N` trimmed fields.
fn fields<const N: usize>(args: &str) -> Result<[&str; N], RoverError> {
    let mut out = [""; N];
    let mut parts = args.split(',');
    for slot in out.iter_mut() {
        *slot = parts.next().ok_or(RoverError::ParseFailure)?.trim();
    }
    if parts.next().is_some() {
        return Err(RoverError::ParseFailure);
    }
    Ok(out)
}

fn parse_bool(raw: &str) -> Result<bool, RoverError> {
    match raw {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(RoverError::ParseFailure),
    }
}

fn parse_real(raw: &str) -> Result<f32, RoverError> {
    raw.parse::<f32>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or(RoverError::ParseFailure)
}
