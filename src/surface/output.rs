//! Output buffers for the pad grid and the text display
//!
//! Handlers draw into these during a flush; only cells that differ from the
//! last value written to the hardware are sent.

use crate::control::Selector;

/// Registry group whose controls form the pad grid
pub const GRID_GROUP: &str = "pad";

/// Pad colors, indexed by position in the grid group
#[derive(Debug, Clone)]
pub struct PadGrid {
    outputs: Vec<Selector>,
    colors: Vec<u8>,
    shadow: Vec<Option<u8>>,
}

impl PadGrid {
    pub fn new(outputs: Vec<Selector>) -> Self {
        let len = outputs.len();
        Self {
            outputs,
            colors: vec![0; len],
            shadow: vec![None; len],
        }
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Set a pad color; out of range pads are ignored
    pub fn light(&mut self, index: usize, color: u8) {
        if let Some(slot) = self.colors.get_mut(index) {
            *slot = color & 0x7F;
        }
    }

    pub fn color(&self, index: usize) -> Option<u8> {
        self.colors.get(index).copied()
    }

    /// Turn every pad off before a redraw
    pub fn clear(&mut self) {
        self.colors.iter_mut().for_each(|c| *c = 0);
    }

    /// Forget what the hardware shows
    pub fn invalidate(&mut self) {
        self.shadow.iter_mut().for_each(|s| *s = None);
    }

    /// Messages for pads whose color changed; updates the shadow
    pub fn take_changes(&mut self) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        for (i, &color) in self.colors.iter().enumerate() {
            if self.shadow[i] != Some(color) {
                self.shadow[i] = Some(color);
                out.push(self.outputs[i].encode(color));
            }
        }
        out
    }
}

/// Text cells of the controller display
#[derive(Debug, Clone)]
pub struct DisplayBuffer {
    rows: usize,
    cells: usize,
    text: Vec<String>,
    shadow: Vec<Option<String>>,
}

impl DisplayBuffer {
    pub fn new(rows: usize, cells: usize) -> Self {
        Self {
            rows,
            cells,
            text: vec![String::new(); rows * cells],
            shadow: vec![None; rows * cells],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cells(&self) -> usize {
        self.cells
    }

    /// Write a cell; out of range cells are ignored
    pub fn set_cell(&mut self, row: usize, cell: usize, text: impl Into<String>) {
        if row < self.rows && cell < self.cells {
            self.text[row * self.cells + cell] = text.into();
        }
    }

    pub fn cell(&self, row: usize, cell: usize) -> Option<&str> {
        if row < self.rows && cell < self.cells {
            Some(self.text[row * self.cells + cell].as_str())
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.text.iter_mut().for_each(String::clear);
    }

    pub fn invalidate(&mut self) {
        self.shadow.iter_mut().for_each(|s| *s = None);
    }

    /// `(row, cell, text)` for every changed cell; updates the shadow
    pub fn take_changes(&mut self) -> Vec<(usize, usize, String)> {
        let mut out = Vec::new();
        for (i, text) in self.text.iter().enumerate() {
            if self.shadow[i].as_deref() != Some(text.as_str()) {
                self.shadow[i] = Some(text.clone());
                out.push((i / self.cells, i % self.cells, text.clone()));
            }
        }
        out
    }
}
