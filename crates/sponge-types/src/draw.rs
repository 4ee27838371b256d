//! Drawing command model.
//!
//! Commands serialize with an `action` tag in the vocabulary the host
//! renderer understands: camelCase canvas context calls and snake-case
//! turtle primitives. [`DrawCommand::Reset`] travels as `clear` and wipes the
//! surface.

use serde::{Deserialize, Serialize};

/// A colour as either a CSS string or an RGB triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Color {
    Named(String),
    Rgb([f64; 3]),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum DrawCommand {
    // ── Surface ──
    #[serde(rename = "clear")]
    Reset,

    // ── Canvas ──
    #[serde(rename = "fillRect")]
    FillRect { x: f64, y: f64, width: f64, height: f64 },
    #[serde(rename = "strokeRect")]
    StrokeRect { x: f64, y: f64, width: f64, height: f64 },
    #[serde(rename = "clearRect")]
    ClearRect { x: f64, y: f64, width: f64, height: f64 },
    #[serde(rename = "beginPath")]
    BeginPath,
    #[serde(rename = "closePath")]
    ClosePath,
    #[serde(rename = "moveTo")]
    MoveTo { x: f64, y: f64 },
    #[serde(rename = "lineTo")]
    LineTo { x: f64, y: f64 },
    #[serde(rename = "arc")]
    Arc {
        x: f64,
        y: f64,
        radius: f64,
        #[serde(rename = "startAngle")]
        start_angle: f64,
        #[serde(rename = "endAngle")]
        end_angle: f64,
        counterclockwise: bool,
    },
    #[serde(rename = "stroke")]
    Stroke,
    #[serde(rename = "fill")]
    Fill,
    #[serde(rename = "fillText")]
    FillText { text: String, x: f64, y: f64 },
    #[serde(rename = "strokeText")]
    StrokeText { text: String, x: f64, y: f64 },
    #[serde(rename = "drawImage")]
    DrawImage {
        #[serde(rename = "imageURI")]
        image_uri: String,
        dx: f64,
        dy: f64,
        dwidth: f64,
        dheight: f64,
    },
    #[serde(rename = "fillStyle")]
    FillStyle { color: Color },
    #[serde(rename = "strokeStyle")]
    StrokeStyle { color: Color },
    #[serde(rename = "lineWidth")]
    LineWidth { value: f64 },
    #[serde(rename = "font")]
    Font { value: String },
    #[serde(rename = "textAlign")]
    TextAlign { value: String },

    // ── Turtle ──
    #[serde(rename = "forward")]
    Forward { value: f64 },
    #[serde(rename = "backward")]
    Backward { value: f64 },
    #[serde(rename = "left")]
    Left { value: f64 },
    #[serde(rename = "right")]
    Right { value: f64 },
    #[serde(rename = "setposition")]
    SetPosition { x: f64, y: f64 },
    #[serde(rename = "setheading")]
    SetHeading { value: f64 },
    #[serde(rename = "penup")]
    PenUp,
    #[serde(rename = "pendown")]
    PenDown,
    #[serde(rename = "pensize")]
    PenSize { value: f64 },
    #[serde(rename = "pencolor")]
    PenColor { value: Color },
    #[serde(rename = "fillcolor")]
    FillColor { value: Color },
    #[serde(rename = "circle")]
    Circle { radius: f64, extent: f64 },
    #[serde(rename = "begin_fill")]
    BeginFill,
    #[serde(rename = "end_fill")]
    EndFill,
    #[serde(rename = "hideturtle")]
    HideTurtle,
    #[serde(rename = "showturtle")]
    ShowTurtle,
    #[serde(rename = "speed")]
    Speed { value: f64 },
}

impl DrawCommand {
    /// Whether the command drives the turtle rather than the 2D canvas.
    pub fn is_turtle(&self) -> bool {
        matches!(
            self,
            DrawCommand::Forward { .. }
                | DrawCommand::Backward { .. }
                | DrawCommand::Left { .. }
                | DrawCommand::Right { .. }
                | DrawCommand::SetPosition { .. }
                | DrawCommand::SetHeading { .. }
                | DrawCommand::PenUp
                | DrawCommand::PenDown
                | DrawCommand::PenSize { .. }
                | DrawCommand::PenColor { .. }
                | DrawCommand::FillColor { .. }
                | DrawCommand::Circle { .. }
                | DrawCommand::BeginFill
                | DrawCommand::EndFill
                | DrawCommand::HideTurtle
                | DrawCommand::ShowTurtle
                | DrawCommand::Speed { .. }
        )
    }
}
