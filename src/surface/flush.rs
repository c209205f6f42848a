//! Coalesced hardware refresh
//!
//! Any number of `request_flush` calls before the tick fires collapse into a
//! single render. Requests arriving during a render schedule exactly one
//! follow-up pass.

use std::fmt;
use std::hash::Hash;
use std::time::Duration;
use tracing::{error, trace};

use super::output::GRID_GROUP;
use super::ControlSurface;
use crate::control::LogicalControl;
use crate::featuregroup::{FeatureGroupManager, ModeId, ViewId};
use crate::scheduler::{Scheduler, Task};

/// Pending-request counter with a single armed flush task
#[derive(Debug)]
pub struct FlushScheduler {
    pending: u32,
    armed: bool,
    tick: Duration,
    renders: u64,
}

impl FlushScheduler {
    pub fn new(tick: Duration) -> Self {
        Self {
            pending: 0,
            armed: false,
            tick,
            renders: 0,
        }
    }

    pub fn set_tick(&mut self, tick: Duration) {
        self.tick = tick;
    }

    /// Count a request and arm the flush task if none is waiting
    pub fn request(&mut self, scheduler: &dyn Scheduler) {
        self.pending = self.pending.saturating_add(1);
        if !self.armed {
            self.armed = true;
            scheduler.schedule(Task::Flush, self.tick);
        }
    }

    /// The flush task fired; false when there is nothing to do
    pub fn begin(&mut self) -> bool {
        if self.pending == 0 {
            self.armed = false;
            return false;
        }
        self.pending = 1;
        true
    }

    /// Render done; re-arm if more requests came in meanwhile
    pub fn finish(&mut self, scheduler: &dyn Scheduler) {
        self.renders += 1;
        if self.pending > 1 {
            self.pending = 1;
            scheduler.schedule(Task::Flush, self.tick);
        } else {
            self.pending = 0;
            self.armed = false;
        }
    }

    /// A full render ran outside the tick and covered every pending request
    ///
    /// An already armed task stays scheduled and finds nothing to do.
    pub fn forced(&mut self) {
        self.pending = 0;
        self.renders += 1;
    }

    pub fn pending(&self) -> u32 {
        self.pending
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Completed render passes
    pub fn render_count(&self) -> u64 {
        self.renders
    }
}

/// Light value from the active handler of one group, falling through an
/// overlay that defers
fn group_color<K>(
    manager: &FeatureGroupManager<K>,
    control: &LogicalControl,
) -> anyhow::Result<Option<u8>>
where
    K: Copy + Eq + Hash + fmt::Display,
{
    if let Some(handler) = manager.active() {
        if let Some(color) = handler.color(control)? {
            return Ok(Some(color));
        }
    }
    if manager.is_temporary() {
        if let Some(handler) = manager.active_ignore_temporary() {
            return handler.color(control);
        }
    }
    Ok(None)
}

/// Light value of a control: the active mode wins, then the active view
fn resolve_color(
    modes: &FeatureGroupManager<ModeId>,
    views: &FeatureGroupManager<ViewId>,
    control: &LogicalControl,
) -> anyhow::Result<Option<u8>> {
    if let Some(color) = group_color(modes, control)? {
        return Ok(Some(color));
    }
    group_color(views, control)
}

impl ControlSurface {
    /// Ask for a hardware refresh on the next tick
    pub fn request_flush(&mut self) {
        self.flush.request(self.scheduler.as_ref());
    }

    /// Flush task entry point
    pub(crate) fn run_flush(&mut self) {
        if !self.flush.begin() {
            trace!("Stale flush task");
            return;
        }
        self.render();
        self.flush.finish(self.scheduler.as_ref());
    }

    /// Write every light, pad and display cell regardless of what the
    /// hardware is believed to show
    pub fn force_flush(&mut self) {
        self.registry.clear_light_shadows();
        self.grid.invalidate();
        self.display.invalidate();
        self.flexi.clear_feedback_shadow();
        self.render();
        self.flush.forced();
    }

    fn render(&mut self) {
        self.render_lights();
        self.render_grid();
        self.render_display();

        for bytes in self.flexi.collect_feedback(self.host.as_ref()) {
            self.host.send_midi(&bytes);
        }
    }

    fn render_lights(&mut self) {
        for control in self.registry.iter_mut() {
            if !control.has_light() || control.group().is_some_and(|(group, _)| group == GRID_GROUP) {
                continue;
            }
            let Some(output) = control.output() else {
                continue;
            };

            let color = match resolve_color(&self.modes, &self.views, control) {
                Ok(color) => color.unwrap_or(0),
                Err(e) => {
                    error!("Failed to render light {}: {:#}", control.name(), e);
                    continue;
                }
            };

            if control.state.light_shadow != Some(color) {
                control.state.light_shadow = Some(color);
                self.host.send_midi(&output.encode(color));
            }
        }
    }

    fn render_grid(&mut self) {
        if self.grid.is_empty() {
            return;
        }
        self.grid.clear();
        if let Some(view) = self.views.active() {
            if let Err(e) = view.draw_grid(&mut self.grid) {
                error!("Failed to draw grid of {}: {:#}", view.name(), e);
                return;
            }
        }
        for bytes in self.grid.take_changes() {
            self.host.send_midi(&bytes);
        }
    }

    fn render_display(&mut self) {
        self.display.clear();

        // Mode text is drawn over the view
        let view = self.views.active();
        let mode = self.modes.active();
        for handler in [view, mode].into_iter().flatten() {
            if let Err(e) = handler.update_display(&mut self.display) {
                error!("Failed to update display from {}: {:#}", handler.name(), e);
            }
        }

        for (row, cell, text) in self.display.take_changes() {
            self.host.update_display_cell(row, cell, &text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualScheduler;

    #[test]
    fn test_coalesces_requests() {
        let scheduler = ManualScheduler::new();
        let mut flush = FlushScheduler::new(Duration::from_millis(1));

        for _ in 0..5 {
            flush.request(&scheduler);
        }
        assert_eq!(scheduler.pending(), 1);

        assert!(flush.begin());
        flush.finish(&scheduler);
        assert_eq!(flush.render_count(), 1);
        assert!(!flush.is_armed());
    }

    #[test]
    fn test_request_during_render_rearms_once() {
        let scheduler = ManualScheduler::new();
        let mut flush = FlushScheduler::new(Duration::from_millis(1));
        flush.request(&scheduler);
        scheduler.advance(Duration::from_millis(1));

        assert!(flush.begin());
        flush.request(&scheduler);
        flush.request(&scheduler);
        // Still armed: no extra task while rendering
        assert_eq!(scheduler.pending(), 0);
        flush.finish(&scheduler);
        assert_eq!(scheduler.pending(), 1);

        assert!(flush.begin());
        flush.finish(&scheduler);
        assert_eq!(flush.render_count(), 2);
        assert_eq!(flush.pending(), 0);
    }

    #[test]
    fn test_stale_task_is_noop() {
        let mut flush = FlushScheduler::new(Duration::from_millis(1));
        assert!(!flush.begin());
        assert_eq!(flush.render_count(), 0);
    }
}
