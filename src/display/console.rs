use std::io::{self, Write};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::{
    cursor::{Hide, MoveToColumn, Show},
    execute, queue,
    style::{Color, Print, ResetColor, SetBackgroundColor},
    terminal::{self, Clear, ClearType},
};

use super::{Device, FRAME_INTERVAL};
use crate::handoff::CancelToken;

const FLASH_COUNT: u32 = 6;
const FLASH_INTERVAL: Duration = Duration::from_millis(150);

/// Scrolling marquee on the controlling terminal: one line of text moving
/// right-to-left, restarting from the right edge once the tail scrolls off.
/// Stands in for the LED panel on hosts without one, with the same timing.
pub struct ConsoleDisplay {
    out: io::Stdout,
    width: usize,
}

impl ConsoleDisplay {
    pub fn new() -> Result<Self> {
        let (cols, _rows) = terminal::size().unwrap_or((80, 24));
        Ok(Self {
            out: io::stdout(),
            width: cols.max(10) as usize,
        })
    }
}

impl Device for ConsoleDisplay {
    fn flourish(&mut self) -> Result<()> {
        execute!(self.out, Hide)?;
        let blank = " ".repeat(self.width);
        for _ in 0..FLASH_COUNT {
            queue!(
                self.out,
                MoveToColumn(0),
                SetBackgroundColor(Color::Red),
                Print(&blank),
                ResetColor
            )?;
            self.out.flush()?;
            thread::sleep(FLASH_INTERVAL);

            queue!(self.out, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
            self.out.flush()?;
            thread::sleep(FLASH_INTERVAL);
        }
        Ok(())
    }

    fn scroll_text(&mut self, text: &str, max: Duration, cancel: &CancelToken) -> Result<()> {
        let deadline = Instant::now() + max;
        let len = text.chars().count() as isize;
        let mut pos = self.width as isize;

        while Instant::now() < deadline && !cancel.is_cancelled() {
            let line = marquee_frame(text, pos, self.width);
            queue!(
                self.out,
                MoveToColumn(0),
                Clear(ClearType::CurrentLine),
                Print(line)
            )?;
            self.out.flush()?;

            pos -= 1;
            if pos + len < 0 {
                pos = self.width as isize;
            }
            thread::sleep(FRAME_INTERVAL);
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        execute!(self.out, MoveToColumn(0), Clear(ClearType::CurrentLine), Show)?;
        Ok(())
    }
}

/// The visible window of `text` when its first character sits at column
/// `pos` (negative once the head has scrolled off the left edge).
fn marquee_frame(text: &str, pos: isize, width: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut line = String::with_capacity(width);
    for col in 0..width as isize {
        let idx = col - pos;
        if idx >= 0 && (idx as usize) < chars.len() {
            line.push(chars[idx as usize]);
        } else {
            line.push(' ');
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_starts_blank_at_right_edge() {
        assert_eq!(marquee_frame("FIRE", 10, 10), " ".repeat(10));
    }

    #[test]
    fn frame_shows_head_as_it_enters() {
        assert_eq!(marquee_frame("FIRE", 8, 10), "        FI");
    }

    #[test]
    fn frame_at_origin_shows_text_left_aligned() {
        assert_eq!(marquee_frame("FIRE", 0, 10), "FIRE      ");
    }

    #[test]
    fn frame_clips_head_once_past_left_edge() {
        assert_eq!(marquee_frame("FIRE", -2, 10), "RE        ");
    }

    #[test]
    fn long_text_fills_the_window() {
        assert_eq!(marquee_frame("STRUCTURE FIRE", 0, 9), "STRUCTURE");
    }
}
