//! REPL – the interactive console driving a [`MotionServer`].
//!
//! Supported commands:
//!   goal x y yaw [frame] – send a goal (yaw in radians, frame defaults to odom)
//!   stop                 – preempt the running goal
//!   set <name> <value>   – change a motion parameter
//!   params               – list motion parameters
//!   obstacle x y         – drop an obstacle at an odom position
//!   clear                – remove all obstacles
//!   status               – goal, pose and obstacle summary
//!   help                 – show this list
//!   quit | exit          – leave the console

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use strider_control::MotionParams;
use strider_hal::{SimulatedBase, SimulatedObstacles};
use strider_runtime::MotionServer;
use strider_types::{FrameId, Point2, Pose2D};

const DEFAULT_GOAL_FRAME: &str = "odom";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Goal { pose: Pose2D, frame: FrameId },
    Stop,
    Set { name: String, value: String },
    Params,
    Obstacle(Point2),
    Clear,
    Status,
    Help,
    Quit,
}

/// Parse one console line.  `Ok(None)` for a blank line.
pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((&head, args)) = words.split_first() else {
        return Ok(None);
    };
    let command = match (head, args) {
        ("goal", [x, y, yaw]) => Command::Goal {
            pose: Pose2D::new(number(x)?, number(y)?, number(yaw)?),
            frame: FrameId::new(DEFAULT_GOAL_FRAME),
        },
        ("goal", [x, y, yaw, frame]) => Command::Goal {
            pose: Pose2D::new(number(x)?, number(y)?, number(yaw)?),
            frame: FrameId::new(*frame),
        },
        ("goal", _) => return Err("usage: goal <x> <y> <yaw> [frame]".into()),
        ("stop", []) => Command::Stop,
        ("set", [name, value]) => Command::Set {
            name: name.to_string(),
            value: value.to_string(),
        },
        ("set", _) => return Err("usage: set <name> <value>".into()),
        ("params", []) => Command::Params,
        ("obstacle", [x, y]) => Command::Obstacle(Point2::new(number(x)?, number(y)?)),
        ("obstacle", _) => return Err("usage: obstacle <x> <y>".into()),
        ("clear", []) => Command::Clear,
        ("status", []) => Command::Status,
        ("help", []) => Command::Help,
        ("quit" | "exit", []) => Command::Quit,
        (other, _) => return Err(format!("unknown command '{other}'")),
    };
    Ok(Some(command))
}

fn number(word: &str) -> Result<f32, String> {
    word.parse::<f32>()
        .map_err(|_| format!("'{word}' is not a number"))
}

/// What the console drives: the server plus the simulated world behind it.
pub struct Console<'a> {
    pub server: &'a MotionServer,
    pub base: &'a SimulatedBase,
    pub field: &'a SimulatedObstacles,
}

/// Entry point for the interactive console.
///
/// `shutdown` is polled each iteration; when set the console exits.
pub fn run(console: &Console<'_>, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    while !shutdown.load(Ordering::SeqCst) {
        print!("{} ", "strider>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        match parse(&line) {
            Ok(None) => {}
            Ok(Some(Command::Quit)) => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
            }
            Ok(Some(command)) => console.execute(command),
            Err(e) => println!(
                "{} {}. Type {} for available commands.",
                "Error:".red(),
                e,
                "help".bold()
            ),
        }
    }
}

impl Console<'_> {
    pub fn execute(&self, command: Command) {
        match command {
            Command::Goal { pose, frame } => match self.server.submit_pose(pose, frame) {
                Ok(id) => println!("{} goal {}", "→".green(), id.to_string().dimmed()),
                Err(e) => println!("{}: {}", "Rejected".red(), e),
            },
            Command::Stop => {
                self.server.cancel();
                println!("{}", "stop requested".yellow());
            }
            Command::Set { name, value } => match self.server.set_param(&name, &value) {
                Ok(version) => println!("{} {} = {} (v{})", "✓".green(), name, value, version),
                Err(e) => println!("{}: {}", "Error".red(), e),
            },
            Command::Params => print_params(&self.server.context().params.snapshot()),
            Command::Obstacle(point) => {
                self.field.add_point(point);
                println!("{} obstacle at ({:.2}, {:.2})", "+".yellow(), point.x, point.y);
            }
            Command::Clear => {
                self.field.clear();
                println!("{}", "obstacles cleared".green());
            }
            Command::Status => self.print_status(),
            Command::Help => cmd_help(),
            Command::Quit => {}
        }
    }

    fn print_status(&self) {
        let ctx = self.server.context();
        let pose = self.base.odom_pose();
        let board = ctx.board.latest();
        println!("{}", "Status".bold().underline());
        println!("  state    : {:?}", self.server.state());
        match self.server.active_goal() {
            Some(id) => println!("  goal     : {}", id),
            None => println!("  goal     : {}", "none".dimmed()),
        }
        println!(
            "  odom     : x={:.3} y={:.3} yaw={:.1}°",
            pose.x,
            pose.y,
            pose.yaw.to_degrees()
        );
        println!(
            "  obstacle : fwd={} left={} right={} ({} points)",
            meters(board.forward_dist),
            meters(board.left_dist),
            meters(board.right_dist),
            self.field.points().len()
        );
        println!("  params   : v{}", ctx.params.version());
    }
}

fn meters(d: f32) -> String {
    if d.is_finite() {
        format!("{d:.2} m")
    } else {
        "clear".into()
    }
}

fn print_params(p: &MotionParams) {
    println!("{}", "Motion parameters".bold().underline());
    for name in MotionParams::NAMES {
        let value = p.get_field(name).unwrap_or_default();
        let shown = if value.is_empty() { "\"\"".dimmed().to_string() } else { value };
        println!("  {:<36} {}", name, shown.yellow());
    }
}

fn cmd_help() {
    println!();
    println!("{}", "Strider Commands".bold().underline());
    println!("  {}  – drive to a pose", "goal <x> <y> <yaw> [frame]".bold().cyan());
    println!("  {}                        – preempt the running goal", "stop".bold().cyan());
    println!("  {}          – change a motion parameter", "set <name> <value>".bold().cyan());
    println!("  {}                      – list motion parameters", "params".bold().cyan());
    println!("  {}                – place an obstacle (odom)", "obstacle <x> <y>".bold().cyan());
    println!("  {}                       – remove all obstacles", "clear".bold().cyan());
    println!("  {}                      – goal, pose and obstacles", "status".bold().cyan());
    println!("  {}                 – exit the console", "quit  exit".bold().cyan());
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_line_is_nothing() {
        assert_eq!(parse("   \n"), Ok(None));
    }

    #[test]
    fn goal_defaults_to_odom() {
        let cmd = parse("goal 1 2.5 -0.5").unwrap().unwrap();
        assert_eq!(
            cmd,
            Command::Goal {
                pose: Pose2D::new(1.0, 2.5, -0.5),
                frame: FrameId::new("odom"),
            }
        );
    }

    #[test]
    fn goal_frame_is_normalised() {
        match parse("goal 0 0 0 /map").unwrap().unwrap() {
            Command::Goal { frame, .. } => assert_eq!(frame.as_str(), "map"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn non_finite_goal_still_parses() {
        // Rejection happens at submission so it is reported on the bus.
        match parse("goal 1 0 nan").unwrap().unwrap() {
            Command::Goal { pose, .. } => assert!(pose.yaw.is_nan()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bad_arguments_report_usage() {
        assert!(parse("goal 1 2").unwrap_err().starts_with("usage"));
        assert!(parse("goal one 2 3").unwrap_err().contains("not a number"));
        assert!(parse("set max_linear_velocity").unwrap_err().starts_with("usage"));
        assert!(parse("obstacle 1").unwrap_err().starts_with("usage"));
    }

    #[test]
    fn simple_commands() {
        assert_eq!(parse("stop").unwrap(), Some(Command::Stop));
        assert_eq!(parse("params").unwrap(), Some(Command::Params));
        assert_eq!(parse("clear").unwrap(), Some(Command::Clear));
        assert_eq!(parse("status").unwrap(), Some(Command::Status));
        assert_eq!(parse("help").unwrap(), Some(Command::Help));
        assert_eq!(parse("exit").unwrap(), Some(Command::Quit));
        assert_eq!(
            parse("obstacle 0.5 -0.1").unwrap(),
            Some(Command::Obstacle(Point2::new(0.5, -0.1)))
        );
        assert_eq!(
            parse("set base_frame base_link").unwrap(),
            Some(Command::Set {
                name: "base_frame".into(),
                value: "base_link".into()
            })
        );
    }

    #[test]
    fn unknown_command_is_named() {
        assert_eq!(parse("warp 9").unwrap_err(), "unknown command 'warp'");
    }

    #[test]
    fn meters_renders_clear_for_infinity() {
        assert_eq!(meters(f32::INFINITY), "clear");
        assert_eq!(meters(1.234), "1.23 m");
    }
}
