//! The loaded-module handle returned to callers.

use crate::callbacks::Callbacks;
use log::warn;

/// Mirrors the pipeline a load passes through. Any stage's failure skips
/// straight to teardown; there is no partially-loaded state a caller can
/// observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Allocated,
    SectionsCopied,
    Relocated,
    ImportsBound,
    Finalized,
    EntryInvoked,
}

/// An in-process, loaded PE image.
///
/// Owns the reserved virtual memory region backing the image and every
/// dependency handle returned by its [`Callbacks`] during import binding.
/// Both are released together, in [`Module::free`] or on drop.
pub struct Module {
    pub(crate) code_base: *mut u8,
    pub(crate) size_of_image: usize,
    pub(crate) dependencies: Vec<usize>,
    pub(crate) initialized: bool,
    pub(crate) state: LoadState,
    pub(crate) callbacks: Box<dyn Callbacks>,
}

impl Module {
    pub(crate) fn new(code_base: *mut u8, size_of_image: usize, callbacks: Box<dyn Callbacks>) -> Self {
        Module {
            code_base,
            size_of_image,
            dependencies: Vec::new(),
            initialized: false,
            state: LoadState::Allocated,
            callbacks,
        }
    }

    /// Base address of the mapped image.
    pub fn code_base(&self) -> *mut u8 {
        self.code_base
    }

    pub fn size_of_image(&self) -> usize {
        self.size_of_image
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    /// Whether the entry point was reached and returned success.
    pub fn initialized(&self) -> bool {
        self.initialized
    }

    /// Releases every dependency handle (in the order they were acquired)
    /// and the image's virtual memory. Accepts an already-released module
    /// as a no-op, matching `MemoryFreeLibrary(NULL)`.
    pub fn free(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        for handle in self.dependencies.drain(..) {
            self.callbacks.free(handle);
        }
        if !self.code_base.is_null() {
            #[cfg(windows)]
            unsafe {
                crate::loader::alloc::free(self.code_base, self.size_of_image)
            };
            self.code_base = std::ptr::null_mut();
        }
    }
}

impl Drop for Module {
    fn drop(&mut self) {
        if !self.code_base.is_null() {
            warn!("Module dropped without an explicit free(); releasing now");
            self.teardown();
        }
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("code_base", &self.code_base)
            .field("size_of_image", &self.size_of_image)
            .field("dependencies", &self.dependencies.len())
            .field("state", &self.state)
            .finish()
    }
}
