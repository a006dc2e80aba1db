//! Battery status page for a 128×64 monochrome OLED

use core::fmt::Write;

use embedded_graphics::{
    Drawable,
    mono_font::{MonoTextStyle, ascii::FONT_6X10},
    pixelcolor::BinaryColor,
    prelude::*,
    primitives::{PrimitiveStyle, Rectangle},
    text::{Baseline, Text},
};
use heapless::String;

use crate::battery::{BatterySample, ClampPolicy, DeviceState, battery_percent, clamp_display_percent};

pub const DISPLAY_WIDTH_PX: u32 = 128;
pub const DISPLAY_HEIGHT_PX: u32 = 64;

const LINE_HEIGHT_PX: i32 = 10;
const GAUGE_WIDTH_PX: u32 = 20;
const GAUGE_HEIGHT_PX: u32 = 44;
const GAUGE_ORIGIN: Point = Point::new((DISPLAY_WIDTH_PX - GAUGE_WIDTH_PX - 4) as i32, 4);
const LINE_CAPACITY: usize = 24;

/// Something that shows the battery station's state after each cycle.
pub trait DisplayRenderer {
    type Error;

    fn render(&mut self, sample: &BatterySample) -> Result<(), Self::Error>;
}

/// Renderer for nodes without a screen.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDisplay;

impl DisplayRenderer for NoDisplay {
    type Error = core::convert::Infallible;

    fn render(&mut self, _sample: &BatterySample) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Text on the left, a vertical charge gauge on the right.
///
/// The whole page is redrawn each frame; at one frame per second there is no
/// point in tracking dirty regions.
pub struct BatteryDisplay<D> {
    target: D,
    clamp: ClampPolicy,
}

impl<D> BatteryDisplay<D>
where
    D: DrawTarget<Color = BinaryColor>,
{
    pub fn new(target: D) -> Self {
        Self {
            target,
            clamp: ClampPolicy::default(),
        }
    }

    pub fn with_clamp(mut self, clamp: ClampPolicy) -> Self {
        self.clamp = clamp;
        self
    }

    pub fn target(&self) -> &D {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut D {
        &mut self.target
    }

    /// Show the start-up screen before the first sample.
    pub fn draw_splash(&mut self) -> Result<(), D::Error> {
        self.target.clear(BinaryColor::Off)?;
        self.line(0, DeviceState::Booting.label())
    }

    pub fn draw_sample(&mut self, sample: &BatterySample) -> Result<(), D::Error> {
        self.target.clear(BinaryColor::Off)?;

        self.line(0, sample.state.label())?;

        let mut text: String<LINE_CAPACITY> = String::new();
        let _ = write!(text, "{:.1} mA", sample.power.current_ma);
        self.line(1, &text)?;

        text.clear();
        let _ = write!(text, "{:.2} V", sample.load_voltage_v);
        self.line(2, &text)?;

        let acc = &sample.accumulator;
        text.clear();
        let _ = write!(text, "+{:.3}mAh ", acc.charged_mah);
        push_duration(&mut text, acc.charged_ms);
        self.line(3, &text)?;

        text.clear();
        let _ = write!(text, "-{:.3}mAh ", acc.discharged_mah);
        push_duration(&mut text, acc.discharged_ms);
        self.line(4, &text)?;

        let percent = clamp_display_percent(battery_percent(sample.load_voltage_v), self.clamp);
        self.gauge(percent)
    }

    fn line(&mut self, row: i32, text: &str) -> Result<(), D::Error> {
        Text::with_baseline(
            text,
            Point::new(0, row * LINE_HEIGHT_PX),
            MonoTextStyle::new(&FONT_6X10, BinaryColor::On),
            Baseline::Top,
        )
        .draw(&mut self.target)?;
        Ok(())
    }

    fn gauge(&mut self, percent: i32) -> Result<(), D::Error> {
        Rectangle::new(GAUGE_ORIGIN, Size::new(GAUGE_WIDTH_PX, GAUGE_HEIGHT_PX))
            .into_styled(PrimitiveStyle::with_stroke(BinaryColor::On, 1))
            .draw(&mut self.target)?;

        // the fill stops at the frame even when the label reads above 100
        let inner = GAUGE_HEIGHT_PX - 4;
        let fill = (percent.clamp(0, 100) as u32 * inner) / 100;
        if fill > 0 {
            Rectangle::new(
                GAUGE_ORIGIN + Point::new(2, (GAUGE_HEIGHT_PX - 2 - fill) as i32),
                Size::new(GAUGE_WIDTH_PX - 4, fill),
            )
            .into_styled(PrimitiveStyle::with_fill(BinaryColor::On))
            .draw(&mut self.target)?;
        }

        let mut label: String<8> = String::new();
        let _ = write!(label, "{}%", percent);
        Text::with_baseline(
            &label,
            Point::new(GAUGE_ORIGIN.x - 4, GAUGE_ORIGIN.y + GAUGE_HEIGHT_PX as i32 + 2),
            MonoTextStyle::new(&FONT_6X10, BinaryColor::On),
            Baseline::Top,
        )
        .draw(&mut self.target)?;
        Ok(())
    }
}

impl<D> DisplayRenderer for BatteryDisplay<D>
where
    D: DrawTarget<Color = BinaryColor>,
{
    type Error = D::Error;

    fn render(&mut self, sample: &BatterySample) -> Result<(), Self::Error> {
        self.draw_sample(sample)
    }
}

/// Append `ms` as `h:mm:ss`.
fn push_duration<const N: usize>(out: &mut String<N>, ms: u64) {
    let secs = ms / 1000;
    let _ = write!(out, "{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60);
}
