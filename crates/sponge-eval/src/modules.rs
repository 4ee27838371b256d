//! Importable modules: `time`, `os`, `math`, `turtle` and `canvas`.
//!
//! Module functions are plain [`Value::Builtin`]s tagged with their module.
//! Drawing functions translate their arguments into [`DrawCommand`]s and
//! hand them to the host.

use crate::args::{no_args, CallArgs};
use crate::builtins::float_to_int;
use crate::error::{EvalError, EvalResult};
use crate::evaluator::Evaluator;
use crate::host::Host;
use crate::value::{ModuleKind, Value};
use sponge_types::draw::{Color, DrawCommand};

const TIME: &[&str] = &["sleep"];
const OS: &[&str] = &["system"];
const MATH: &[&str] = &["sqrt", "floor", "ceil"];
const TURTLE: &[&str] = &[
    "forward", "fd", "backward", "back", "bk", "left", "lt", "right", "rt", "setposition",
    "setpos", "goto", "setheading", "seth", "penup", "pu", "up", "pendown", "pd", "down",
    "pensize", "width", "pencolor", "fillcolor", "circle", "begin_fill", "end_fill",
    "hideturtle", "ht", "showturtle", "st", "speed",
];
const CANVAS: &[&str] = &[
    "fill_rect", "stroke_rect", "clear_rect", "begin_path", "close_path", "move_to", "line_to",
    "arc", "stroke", "fill", "fill_text", "stroke_text", "draw_image", "fill_style",
    "stroke_style", "line_width", "font", "text_align", "present", "check_key",
];

fn functions(module: ModuleKind) -> &'static [&'static str] {
    match module {
        ModuleKind::Time => TIME,
        ModuleKind::Os => OS,
        ModuleKind::Math => MATH,
        ModuleKind::Turtle => TURTLE,
        ModuleKind::Canvas => CANVAS,
    }
}

/// `module.attr`.
pub(crate) fn attribute(module: ModuleKind, attr: &str) -> EvalResult<Value> {
    match (module, attr) {
        (ModuleKind::Math, "pi") => return Ok(Value::Float(std::f64::consts::PI)),
        (ModuleKind::Math, "e") => return Ok(Value::Float(std::f64::consts::E)),
        _ => {}
    }
    if functions(module).contains(&attr) {
        return Ok(Value::Builtin {
            module: Some(module),
            name: attr.to_string(),
        });
    }
    Err(EvalError::script(
        "AttributeError",
        format!("module '{}' has no attribute '{attr}'", module.name()),
    ))
}

pub(crate) fn call<H: Host>(
    eval: &mut Evaluator<H>,
    module: ModuleKind,
    name: &str,
    call: CallArgs,
) -> EvalResult<Value> {
    match module {
        ModuleKind::Time => {
            call.finish()?;
            call.arity(1, 1)?;
            let seconds = call.number(0)?;
            if seconds < 0.0 {
                return Err(EvalError::value_error("sleep length must be non-negative"));
            }
            eval.host.sleep(seconds)?;
            Ok(Value::None)
        }
        ModuleKind::Os => {
            call.finish()?;
            call.arity(1, 1)?;
            let command = call.string(0)?;
            eval.host.shell(command).map(Value::Int)
        }
        ModuleKind::Math => {
            call.finish()?;
            call.arity(1, 1)?;
            let x = call.number(0)?;
            match name {
                "sqrt" if x < 0.0 => Err(EvalError::value_error("math domain error")),
                "sqrt" => Ok(Value::Float(x.sqrt())),
                "floor" => float_to_int(x.floor()).map(Value::Int),
                _ => float_to_int(x.ceil()).map(Value::Int),
            }
        }
        ModuleKind::Turtle => {
            let command = turtle_command(name, call)?;
            eval.host.draw(command)?;
            Ok(Value::None)
        }
        ModuleKind::Canvas => {
            if name == "check_key" {
                call.finish()?;
                call.arity(1, 1)?;
                // Codes outside 1..=255 are never held.
                let held = match u8::try_from(call.int(0)?) {
                    Ok(code) if code > 0 => eval.host.key_down(code),
                    _ => false,
                };
                return Ok(Value::Bool(held));
            }
            if name == "present" {
                call.finish()?;
                call.arity(0, 0)?;
                eval.host.present()?;
            } else {
                let command = canvas_command(name, call)?;
                eval.host.draw(command)?;
            }
            Ok(Value::None)
        }
    }
}

/// A colour from either one string argument or three numbers.
fn color(call: &CallArgs) -> EvalResult<Color> {
    call.arity(1, 3)?;
    match call.len() {
        1 => match call.value(0)? {
            Value::Str(name) => Ok(Color::Named(name.clone())),
            Value::List(parts) if parts.borrow().len() == 3 => {
                let parts = parts.borrow();
                let mut rgb = [0.0; 3];
                for (slot, part) in rgb.iter_mut().zip(parts.iter()) {
                    *slot = part.as_float().ok_or_else(|| bad_color(call))?;
                }
                Ok(Color::Rgb(rgb))
            }
            _ => Err(bad_color(call)),
        },
        3 => Ok(Color::Rgb([call.number(0)?, call.number(1)?, call.number(2)?])),
        _ => Err(bad_color(call)),
    }
}

fn bad_color(call: &CallArgs) -> EvalError {
    EvalError::value_error(format!("bad color arguments for {}()", call.name))
}

fn turtle_speed(value: &Value) -> EvalResult<f64> {
    match value {
        Value::Str(name) => match name.as_str() {
            "fastest" => Ok(0.0),
            "fast" => Ok(10.0),
            "normal" => Ok(6.0),
            "slow" => Ok(3.0),
            "slowest" => Ok(1.0),
            other => Err(EvalError::value_error(format!("unknown speed '{other}'"))),
        },
        other => {
            let speed = other.as_float().ok_or_else(|| {
                EvalError::type_error(format!("speed() expects a number, not '{}'", other.type_name()))
            })?;
            // Out-of-range speeds mean "no animation".
            Ok(if (0.5..=10.5).contains(&speed) {
                speed.round()
            } else {
                0.0
            })
        }
    }
}

fn turtle_command(name: &str, mut call: CallArgs) -> EvalResult<DrawCommand> {
    let extent = call.take_keyword("extent");
    call.finish()?;
    let command = match name {
        "forward" | "fd" => DrawCommand::Forward { value: one_number(&call)? },
        "backward" | "back" | "bk" => DrawCommand::Backward { value: one_number(&call)? },
        "left" | "lt" => DrawCommand::Left { value: one_number(&call)? },
        "right" | "rt" => DrawCommand::Right { value: one_number(&call)? },
        "setheading" | "seth" => DrawCommand::SetHeading { value: one_number(&call)? },
        "pensize" | "width" => DrawCommand::PenSize { value: one_number(&call)? },
        "setposition" | "setpos" | "goto" => {
            call.arity(2, 2)?;
            DrawCommand::SetPosition {
                x: call.number(0)?,
                y: call.number(1)?,
            }
        }
        "penup" | "pu" | "up" => no_args(&call, DrawCommand::PenUp)?,
        "pendown" | "pd" | "down" => no_args(&call, DrawCommand::PenDown)?,
        "begin_fill" => no_args(&call, DrawCommand::BeginFill)?,
        "end_fill" => no_args(&call, DrawCommand::EndFill)?,
        "hideturtle" | "ht" => no_args(&call, DrawCommand::HideTurtle)?,
        "showturtle" | "st" => no_args(&call, DrawCommand::ShowTurtle)?,
        "pencolor" => DrawCommand::PenColor { value: color(&call)? },
        "fillcolor" => DrawCommand::FillColor { value: color(&call)? },
        "circle" => {
            call.arity(1, 2)?;
            let extent = match call.get(1).or(extent.as_ref()) {
                None | Some(Value::None) => 360.0,
                Some(v) => v.as_float().ok_or_else(|| {
                    EvalError::type_error("circle() extent must be a number")
                })?,
            };
            DrawCommand::Circle {
                radius: call.number(0)?,
                extent,
            }
        }
        _ => {
            call.arity(1, 1)?;
            DrawCommand::Speed {
                value: turtle_speed(call.value(0)?)?,
            }
        }
    };
    Ok(command)
}

fn canvas_command(name: &str, mut call: CallArgs) -> EvalResult<DrawCommand> {
    let counterclockwise = call.take_keyword("counterclockwise");
    call.finish()?;
    let command = match name {
        "fill_rect" | "stroke_rect" | "clear_rect" => {
            call.arity(4, 4)?;
            let (x, y, width, height) = (
                call.number(0)?,
                call.number(1)?,
                call.number(2)?,
                call.number(3)?,
            );
            match name {
                "fill_rect" => DrawCommand::FillRect { x, y, width, height },
                "stroke_rect" => DrawCommand::StrokeRect { x, y, width, height },
                _ => DrawCommand::ClearRect { x, y, width, height },
            }
        }
        "begin_path" => no_args(&call, DrawCommand::BeginPath)?,
        "close_path" => no_args(&call, DrawCommand::ClosePath)?,
        "stroke" => no_args(&call, DrawCommand::Stroke)?,
        "fill" => no_args(&call, DrawCommand::Fill)?,
        "move_to" | "line_to" => {
            call.arity(2, 2)?;
            let (x, y) = (call.number(0)?, call.number(1)?);
            if name == "move_to" {
                DrawCommand::MoveTo { x, y }
            } else {
                DrawCommand::LineTo { x, y }
            }
        }
        "arc" => {
            call.arity(5, 6)?;
            let counterclockwise = call
                .get(5)
                .or(counterclockwise.as_ref())
                .is_some_and(Value::truthy);
            DrawCommand::Arc {
                x: call.number(0)?,
                y: call.number(1)?,
                radius: call.number(2)?,
                start_angle: call.number(3)?,
                end_angle: call.number(4)?,
                counterclockwise,
            }
        }
        "fill_text" | "stroke_text" => {
            call.arity(3, 3)?;
            let text = call.value(0)?.to_str();
            let (x, y) = (call.number(1)?, call.number(2)?);
            if name == "fill_text" {
                DrawCommand::FillText { text, x, y }
            } else {
                DrawCommand::StrokeText { text, x, y }
            }
        }
        "draw_image" => {
            call.arity(5, 5)?;
            DrawCommand::DrawImage {
                image_uri: call.string(0)?.to_string(),
                dx: call.number(1)?,
                dy: call.number(2)?,
                dwidth: call.number(3)?,
                dheight: call.number(4)?,
            }
        }
        "fill_style" => DrawCommand::FillStyle { color: color(&call)? },
        "stroke_style" => DrawCommand::StrokeStyle { color: color(&call)? },
        "line_width" => DrawCommand::LineWidth { value: one_number(&call)? },
        "font" => {
            call.arity(1, 1)?;
            DrawCommand::Font {
                value: call.string(0)?.to_string(),
            }
        }
        _ => {
            call.arity(1, 1)?;
            DrawCommand::TextAlign {
                value: call.string(0)?.to_string(),
            }
        }
    };
    Ok(command)
}

fn one_number(call: &CallArgs) -> EvalResult<f64> {
    call.arity(1, 1)?;
    call.number(0)
}
