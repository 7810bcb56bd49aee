use ash::vk;

/// how many frames the CPU may record ahead of the GPU
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Sync objects owned by one frame slot
#[derive(Default)]
pub(super) struct FrameSync {
    /// signaled by acquire, waited on by submit
    pub(super) image_available: vk::Semaphore,
    /// signaled by submit, waited on by present
    pub(super) render_finished: vk::Semaphore,
    /// signaled when the slot's submit has finished on the GPU
    pub(super) in_flight: vk::Fence,
}

impl FrameSync {
    /// On failure, whatever was already created is destroyed again.
    pub(super) fn create_all(device: &ash::Device) -> anyhow::Result<Vec<Self>> {
        let mut frames: Vec<Self> = (0..MAX_FRAMES_IN_FLIGHT).map(|_| Self::default()).collect();

        for slot in 0..frames.len() {
            if let Err(err) = unsafe { frames[slot].create_objects(device) } {
                for frame in &frames {
                    unsafe { frame.destroy(device) };
                }
                return Err(err.into());
            }
        }

        Ok(frames)
    }

    unsafe fn create_objects(&mut self, device: &ash::Device) -> Result<(), vk::Result> {
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        // created signaled so the first wait of every slot returns immediately
        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);

        unsafe {
            self.image_available = device.create_semaphore(&semaphore_info, None)?;
            self.render_finished = device.create_semaphore(&semaphore_info, None)?;
            self.in_flight = device.create_fence(&fence_info, None)?;
        }

        Ok(())
    }

    pub(super) unsafe fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.image_available, None);
            device.destroy_semaphore(self.render_finished, None);
            device.destroy_fence(self.in_flight, None);
        }
    }
}

/// Round-robin index over the frame slots
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameCursor(usize);

impl FrameCursor {
    pub fn current(&self) -> usize {
        self.0
    }

    pub fn advance(&mut self) {
        self.0 = (self.0 + 1) % MAX_FRAMES_IN_FLIGHT;
    }
}

/// Tracks which frame slot's fence last submitted work for each swapchain image.
///
/// The swapchain may hand back images out of order, and there may be more images
/// than frame slots, so an image can still be in use by an older slot's submit
/// when it is acquired again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagesInFlight(Vec<Option<vk::Fence>>);

impl ImagesInFlight {
    pub fn new(image_count: usize) -> Self {
        Self(vec![None; image_count])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// forget every fence and resize to the new swapchain's image count
    pub fn reset(&mut self, image_count: usize) {
        self.0.clear();
        self.0.resize(image_count, None);
    }

    /// Records `fence` as the owner of `image_index`.
    ///
    /// Returns the fence that previously owned the image, which must be waited
    /// on before the image's resources are touched.
    pub fn claim(&mut self, image_index: usize, fence: vk::Fence) -> Option<vk::Fence> {
        self.0[image_index].replace(fence)
    }
}

/// What to do after trying to acquire a swapchain image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquired {
    /// render into this image (even if the swapchain reported suboptimal)
    Image(u32),
    /// the swapchain no longer matches the surface; rebuild and skip this frame
    OutOfDate,
}

pub fn classify_acquire(result: Result<(u32, bool), vk::Result>) -> Result<Acquired, vk::Result> {
    match result {
        Ok((image_index, _suboptimal)) => Ok(Acquired::Image(image_index)),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquired::OutOfDate),
        Err(err) => Err(err),
    }
}

/// Whether the swapchain must be rebuilt after a present
///
/// `Ok(true)` from present means suboptimal.
pub fn needs_recreate_after_present(
    result: Result<bool, vk::Result>,
    framebuffer_resized: bool,
) -> Result<bool, vk::Result> {
    match result {
        Ok(suboptimal) => Ok(suboptimal || framebuffer_resized),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use ash::vk::Handle;

    fn fence(raw: u64) -> vk::Fence {
        vk::Fence::from_raw(raw)
    }

    #[test]
    fn cursor_wraps_after_max_frames() {
        let mut cursor = FrameCursor::default();
        let mut seen = vec![];
        for _ in 0..(MAX_FRAMES_IN_FLIGHT * 2 + 1) {
            seen.push(cursor.current());
            cursor.advance();
        }

        assert_eq!(seen, vec![0, 1, 0, 1, 0]);
        assert!(seen.iter().all(|slot| *slot < MAX_FRAMES_IN_FLIGHT));
    }

    #[test]
    fn first_claim_of_an_image_needs_no_wait() {
        let mut images = ImagesInFlight::new(3);
        assert_eq!(images.claim(1, fence(10)), None);
    }

    #[test]
    fn reclaiming_an_image_returns_the_previous_owner() {
        let mut images = ImagesInFlight::new(3);
        images.claim(2, fence(10));

        assert_eq!(images.claim(2, fence(20)), Some(fence(10)));
        assert_eq!(images.claim(2, fence(10)), Some(fence(20)));
    }

    #[test]
    fn images_are_tracked_independently() {
        let mut images = ImagesInFlight::new(3);
        images.claim(0, fence(10));
        images.claim(1, fence(20));

        assert_eq!(images.claim(2, fence(10)), None);
        assert_eq!(images.claim(0, fence(20)), Some(fence(10)));
    }

    #[test]
    fn out_of_order_acquire_across_slots() {
        // three images, two slots: image 0 comes back while slot 1 is recording
        let slot_fences = [fence(100), fence(200)];
        let acquired_images = [0, 1, 2, 0];
        let mut cursor = FrameCursor::default();
        let mut images = ImagesInFlight::new(3);
        let mut waits = vec![];

        for image in acquired_images {
            let slot_fence = slot_fences[cursor.current()];
            waits.push(images.claim(image, slot_fence));
            cursor.advance();
        }

        assert_eq!(waits, vec![None, None, None, Some(fence(100))]);
    }

    #[test]
    fn reset_clears_and_resizes() {
        let mut images = ImagesInFlight::new(2);
        images.claim(0, fence(1));
        images.claim(1, fence(2));

        images.reset(4);

        assert_eq!(images.len(), 4);
        assert_eq!(images, ImagesInFlight::new(4));
        assert!(!images.is_empty());
    }

    #[test]
    fn suboptimal_acquire_still_renders() {
        assert_eq!(classify_acquire(Ok((2, true))), Ok(Acquired::Image(2)));
        assert_eq!(classify_acquire(Ok((0, false))), Ok(Acquired::Image(0)));
    }

    #[test]
    fn out_of_date_acquire_skips_the_frame() {
        let result = classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));
        assert_eq!(result, Ok(Acquired::OutOfDate));
    }

    #[test]
    fn other_acquire_errors_propagate() {
        let result = classify_acquire(Err(vk::Result::ERROR_DEVICE_LOST));
        assert_eq!(result, Err(vk::Result::ERROR_DEVICE_LOST));
    }

    #[test]
    fn present_recreates_on_suboptimal_out_of_date_or_resize() {
        assert_eq!(needs_recreate_after_present(Ok(false), false), Ok(false));
        assert_eq!(needs_recreate_after_present(Ok(true), false), Ok(true));
        assert_eq!(needs_recreate_after_present(Ok(false), true), Ok(true));
        assert_eq!(
            needs_recreate_after_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR), false),
            Ok(true)
        );
    }

    #[test]
    fn present_errors_propagate() {
        let result = needs_recreate_after_present(Err(vk::Result::ERROR_SURFACE_LOST_KHR), true);
        assert_eq!(result, Err(vk::Result::ERROR_SURFACE_LOST_KHR));
    }
}
