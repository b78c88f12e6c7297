/*!
 # Strip output

 The physical strip driver is external; the orchestrator only needs a way to
 push a finished pixel buffer. Failures are transient and the caller logs them
 and carries on with the next frame.
*/

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::color::Rgb;
use crate::{Error, Result};

/// Sink for rendered frames
pub trait Strip: Send + 'static {
    fn render(&mut self, pixels: &[Rgb]) -> Result<()>;
}

impl Strip for Box<dyn Strip> {
    fn render(&mut self, pixels: &[Rgb]) -> Result<()> {
        (**self).render(pixels)
    }
}

/// Discards every frame
#[derive(Debug, Default)]
pub struct NullStrip;

impl Strip for NullStrip {
    fn render(&mut self, _pixels: &[Rgb]) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Recorded {
    frames: Vec<Vec<Rgb>>,
    fail_next: usize,
}

/// Records frames in memory. Clones share the recording.
#[derive(Debug, Clone, Default)]
pub struct MemoryStrip {
    recorded: Arc<Mutex<Recorded>>,
}

impl MemoryStrip {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<Vec<Rgb>> {
        self.recorded.lock().frames.clone()
    }

    pub fn frame_count(&self) -> usize {
        self.recorded.lock().frames.len()
    }

    pub fn last_frame(&self) -> Option<Vec<Rgb>> {
        self.recorded.lock().frames.last().cloned()
    }

    /// Fail the next `count` renders
    pub fn fail_next(&self, count: usize) {
        self.recorded.lock().fail_next = count;
    }
}

impl Strip for MemoryStrip {
    fn render(&mut self, pixels: &[Rgb]) -> Result<()> {
        let mut recorded = self.recorded.lock();
        if recorded.fail_next > 0 {
            recorded.fail_next -= 1;
            return Err(Error::Render("transmission failed".to_string()));
        }
        recorded.frames.push(pixels.to_vec());
        Ok(())
    }
}

/// Draws each frame as a row of truecolor blocks
pub struct TerminalStrip {
    out: Box<dyn Write + Send>,
}

impl TerminalStrip {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self { out }
    }

    pub fn stderr() -> Self {
        Self::new(Box::new(std::io::stderr()))
    }
}

impl Strip for TerminalStrip {
    fn render(&mut self, pixels: &[Rgb]) -> Result<()> {
        let mut line = String::with_capacity(pixels.len() * 20 + 8);
        line.push('\r');
        for p in pixels {
            line.push_str(&format!("\x1b[38;2;{};{};{}m█", p.r, p.g, p.b));
        }
        line.push_str("\x1b[0m");
        let out = &mut self.out;
        crate::blocking_io(|| {
            out.write_all(line.as_bytes())?;
            out.flush()
        })?;
        Ok(())
    }
}
