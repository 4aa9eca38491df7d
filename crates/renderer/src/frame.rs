//! Frame-slot state machine.
//!
//! Each of the N frame slots cycles Idle → Recording → Submitted and back to
//! Idle once its fence signals. [`FrameSlots`] drives the cycle round-robin
//! over a [`FrameBackend`], which performs the actual Vulkan work. Keeping the
//! ordering here means it can be exercised without a device.
//!
//! ```text
//! begin: no framebuffers? -> recreate, skip
//!        wait fence[f] -> acquire (OUT_OF_DATE? recreate, skip) -> reset + record
//! end:   submit + present -> Presented: advance (resize pending? recreate)
//!                         -> Suboptimal: recreate, advance
//!                         -> OutOfDate: recreate, keep slot
//! ```

use ash::vk;
use tracing::debug;

use stimply_rhi::RhiResult;

/// Lifecycle of one frame slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Recording,
    Submitted,
}

/// Result of presenting a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

/// The slot and swapchain image being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveFrame {
    pub slot: usize,
    pub image_index: u32,
}

/// Vulkan operations the frame loop is made of.
pub trait FrameBackend {
    /// Whether the swapchain currently has images to render to.
    fn has_framebuffers(&self) -> bool;

    /// Returns and clears the window-resized flag.
    fn take_resize_request(&mut self) -> bool;

    /// Waits for the device to go idle and rebuilds the swapchain chain. May
    /// leave no framebuffers when the surface is degenerate.
    fn recreate(&mut self) -> RhiResult<()>;

    /// Blocks until the slot's previous submission has completed.
    fn wait_for_slot(&mut self, slot: usize) -> RhiResult<()>;

    /// Acquires the next image, signalling the slot's image-acquired
    /// semaphore. `None` means the swapchain is out of date.
    fn acquire_image(&mut self, slot: usize) -> RhiResult<Option<u32>>;

    /// Resets the slot's fence and command buffer, then begins recording into
    /// the render pass for `image_index`.
    fn begin_recording(&mut self, slot: usize, image_index: u32) -> RhiResult<()>;

    /// Ends recording, submits the slot and presents `image_index`.
    fn submit_and_present(&mut self, slot: usize, image_index: u32) -> RhiResult<PresentOutcome>;
}

/// Round-robin frame slot scheduler.
#[derive(Debug)]
pub struct FrameSlots {
    states: Vec<SlotState>,
    current: usize,
    image_index: u32,
}

impl FrameSlots {
    pub fn new(count: usize) -> Self {
        Self {
            states: vec![SlotState::Idle; count.max(1)],
            current: 0,
            image_index: 0,
        }
    }

    /// Number of slots, N.
    #[inline]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Slot the next frame records into.
    #[inline]
    pub fn current(&self) -> usize {
        self.current
    }

    #[inline]
    pub fn state(&self, slot: usize) -> SlotState {
        self.states[slot]
    }

    /// The frame being recorded, if any.
    pub fn active(&self) -> Option<ActiveFrame> {
        (self.states[self.current] == SlotState::Recording).then_some(ActiveFrame {
            slot: self.current,
            image_index: self.image_index,
        })
    }

    /// Starts a frame. `None` means the frame is skipped.
    pub fn begin<B: FrameBackend>(&mut self, backend: &mut B) -> RhiResult<Option<ActiveFrame>> {
        if !backend.has_framebuffers() {
            backend.recreate()?;
            return Ok(None);
        }

        let slot = self.current;
        backend.wait_for_slot(slot)?;
        self.states[slot] = SlotState::Idle;

        let Some(image_index) = backend.acquire_image(slot)? else {
            debug!("Swapchain out of date on acquire");
            backend.recreate()?;
            return Ok(None);
        };

        backend.begin_recording(slot, image_index)?;
        self.states[slot] = SlotState::Recording;
        self.image_index = image_index;
        Ok(Some(ActiveFrame { slot, image_index }))
    }

    /// Submits and presents the recording frame. Returns whether the frame
    /// counter advanced.
    pub fn end<B: FrameBackend>(&mut self, backend: &mut B) -> RhiResult<bool> {
        let slot = self.current;
        if self.states[slot] != SlotState::Recording {
            return Ok(false);
        }

        let outcome = backend.submit_and_present(slot, self.image_index)?;
        self.states[slot] = SlotState::Submitted;

        let resized = backend.take_resize_request();
        match outcome {
            PresentOutcome::Presented if resized => {
                debug!("Window resized, recreating swapchain");
                backend.recreate()?;
            }
            PresentOutcome::Presented => {}
            PresentOutcome::Suboptimal => {
                debug!("Swapchain suboptimal on present");
                backend.recreate()?;
            }
            PresentOutcome::OutOfDate => {
                debug!("Swapchain out of date on present");
                backend.recreate()?;
                return Ok(false);
            }
        }

        self.current = (self.current + 1) % self.states.len();
        Ok(true)
    }
}

/// Viewport flipped vertically so +Y points up in clip space.
pub fn flipped_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: extent.height as f32,
        width: extent.width as f32,
        height: -(extent.height as f32),
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

pub fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        Recreate,
        Wait(usize),
        Acquire(usize),
        Begin(usize, u32),
        Submit(usize, u32),
    }

    struct MockBackend {
        calls: Vec<Call>,
        image_count: u32,
        next_image: u32,
        degenerate: bool,
        framebuffers: bool,
        acquire_out_of_date: bool,
        present: PresentOutcome,
        resized: bool,
    }

    impl MockBackend {
        fn new(image_count: u32) -> Self {
            Self {
                calls: Vec::new(),
                image_count,
                next_image: 0,
                degenerate: false,
                framebuffers: true,
                acquire_out_of_date: false,
                present: PresentOutcome::Presented,
                resized: false,
            }
        }

        fn recreations(&self) -> usize {
            self.calls.iter().filter(|c| **c == Call::Recreate).count()
        }
    }

    impl FrameBackend for MockBackend {
        fn has_framebuffers(&self) -> bool {
            self.framebuffers
        }

        fn take_resize_request(&mut self) -> bool {
            std::mem::take(&mut self.resized)
        }

        fn recreate(&mut self) -> RhiResult<()> {
            self.calls.push(Call::Recreate);
            self.framebuffers = !self.degenerate;
            self.acquire_out_of_date = false;
            self.present = PresentOutcome::Presented;
            Ok(())
        }

        fn wait_for_slot(&mut self, slot: usize) -> RhiResult<()> {
            self.calls.push(Call::Wait(slot));
            Ok(())
        }

        fn acquire_image(&mut self, slot: usize) -> RhiResult<Option<u32>> {
            self.calls.push(Call::Acquire(slot));
            if self.acquire_out_of_date {
                return Ok(None);
            }
            let image = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count;
            Ok(Some(image))
        }

        fn begin_recording(&mut self, slot: usize, image_index: u32) -> RhiResult<()> {
            self.calls.push(Call::Begin(slot, image_index));
            Ok(())
        }

        fn submit_and_present(&mut self, slot: usize, image_index: u32) -> RhiResult<PresentOutcome> {
            self.calls.push(Call::Submit(slot, image_index));
            Ok(self.present)
        }
    }

    fn run_frame(slots: &mut FrameSlots, backend: &mut MockBackend) -> Option<usize> {
        let frame = slots.begin(backend).unwrap()?;
        assert!(slots.end(backend).unwrap());
        Some(frame.slot)
    }

    #[test]
    fn test_slots_cycle_round_robin() {
        let mut backend = MockBackend::new(3);
        let mut slots = FrameSlots::new(3);

        let used: Vec<usize> = (0..7)
            .filter_map(|_| run_frame(&mut slots, &mut backend))
            .collect();
        assert_eq!(used, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_fence_waited_before_reset() {
        let mut backend = MockBackend::new(2);
        let mut slots = FrameSlots::new(2);
        for _ in 0..4 {
            run_frame(&mut slots, &mut backend);
        }

        for (i, call) in backend.calls.iter().enumerate() {
            if let Call::Begin(slot, _) = *call {
                let last_wait = backend.calls[..i]
                    .iter()
                    .rposition(|c| matches!(c, Call::Wait(_)))
                    .unwrap();
                assert_eq!(backend.calls[last_wait], Call::Wait(slot));
            }
        }
    }

    #[test]
    fn test_state_transitions() {
        let mut backend = MockBackend::new(2);
        let mut slots = FrameSlots::new(2);
        assert_eq!(slots.state(0), SlotState::Idle);

        let frame = slots.begin(&mut backend).unwrap().unwrap();
        assert_eq!(frame, ActiveFrame { slot: 0, image_index: 0 });
        assert_eq!(slots.state(0), SlotState::Recording);
        assert_eq!(slots.active(), Some(frame));

        slots.end(&mut backend).unwrap();
        assert_eq!(slots.state(0), SlotState::Submitted);
        assert_eq!(slots.current(), 1);
        assert_eq!(slots.active(), None);
    }

    #[test]
    fn test_degenerate_surface_skips_without_advancing() {
        let mut backend = MockBackend::new(2);
        backend.framebuffers = false;
        backend.degenerate = true;
        let mut slots = FrameSlots::new(2);

        for _ in 0..3 {
            assert_eq!(slots.begin(&mut backend).unwrap(), None);
        }
        assert_eq!(slots.current(), 0);
        assert!(!backend.calls.iter().any(|c| matches!(c, Call::Wait(_))));

        backend.degenerate = false;
        backend.calls.clear();
        assert_eq!(slots.begin(&mut backend).unwrap(), None);
        assert!(slots.begin(&mut backend).unwrap().is_some());
        assert_eq!(backend.recreations(), 1);
    }

    #[test]
    fn test_out_of_date_on_acquire_recreates() {
        let mut backend = MockBackend::new(2);
        backend.acquire_out_of_date = true;
        let mut slots = FrameSlots::new(2);

        assert_eq!(slots.begin(&mut backend).unwrap(), None);
        assert_eq!(backend.recreations(), 1);
        assert_eq!(slots.current(), 0);
        assert!(!backend.calls.iter().any(|c| matches!(c, Call::Begin(..))));
    }

    #[test]
    fn test_out_of_date_on_present_does_not_advance() {
        let mut backend = MockBackend::new(2);
        let mut slots = FrameSlots::new(2);

        slots.begin(&mut backend).unwrap().unwrap();
        backend.present = PresentOutcome::OutOfDate;
        assert!(!slots.end(&mut backend).unwrap());
        assert_eq!(slots.current(), 0);
        assert_eq!(backend.recreations(), 1);
    }

    #[test]
    fn test_suboptimal_present_recreates_and_advances() {
        let mut backend = MockBackend::new(2);
        let mut slots = FrameSlots::new(2);

        slots.begin(&mut backend).unwrap().unwrap();
        backend.present = PresentOutcome::Suboptimal;
        assert!(slots.end(&mut backend).unwrap());
        assert_eq!(slots.current(), 1);
        assert_eq!(backend.recreations(), 1);
    }

    #[test]
    fn test_pending_resize_recreates_once_after_present() {
        let mut backend = MockBackend::new(2);
        let mut slots = FrameSlots::new(2);

        run_frame(&mut slots, &mut backend);
        assert_eq!(backend.recreations(), 0);

        backend.resized = true;
        assert_eq!(run_frame(&mut slots, &mut backend), Some(1));
        assert_eq!(backend.recreations(), 1);
        assert_eq!(backend.calls.last(), Some(&Call::Recreate));

        run_frame(&mut slots, &mut backend);
        assert_eq!(backend.recreations(), 1);
        assert_eq!(slots.current(), 1);
    }

    #[test]
    fn test_out_of_date_with_pending_resize_recreates_once() {
        let mut backend = MockBackend::new(2);
        let mut slots = FrameSlots::new(2);

        slots.begin(&mut backend).unwrap().unwrap();
        backend.resized = true;
        backend.present = PresentOutcome::OutOfDate;
        assert!(!slots.end(&mut backend).unwrap());
        assert_eq!(backend.recreations(), 1);
        assert!(!backend.resized);
    }

    #[test]
    fn test_end_without_begin_is_noop() {
        let mut backend = MockBackend::new(2);
        let mut slots = FrameSlots::new(2);
        assert!(!slots.end(&mut backend).unwrap());
        assert!(backend.calls.is_empty());
    }

    #[test]
    fn test_flipped_viewport() {
        let extent = vk::Extent2D {
            width: 800,
            height: 600,
        };
        let viewport = flipped_viewport(extent);
        assert_eq!(viewport.y, 600.0);
        assert_eq!(viewport.height, -600.0);
        assert_eq!(viewport.width, 800.0);
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));
        assert_eq!(full_scissor(extent).extent, extent);
    }
}
