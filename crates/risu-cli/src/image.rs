//! Loads a checkpoint image as an executable, writable mapping
//! (`original_source/risu.c`'s `load_image`: `PROT_READ | PROT_WRITE |
//! PROT_EXEC`, `MAP_PRIVATE`, writable because the image embeds its own
//! scratch memblock for store testing).

use anyhow::{bail, Context, Result};
use std::fs::File;
use std::os::unix::io::AsRawFd;
use std::path::Path;

pub struct Image {
    base: *mut u8,
    len: usize,
}

// Safety: the mapping is never concurrently accessed from more than one
// thread in this workspace's usage (one role per process).
unsafe impl Send for Image {}

impl Image {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("opening image {}", path.display()))?;
        let len = file
            .metadata()
            .with_context(|| format!("stat image {}", path.display()))?
            .len() as usize;
        if len == 0 {
            bail!("image {} is empty", path.display());
        }

        let addr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
                libc::MAP_PRIVATE,
                file.as_raw_fd(),
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            bail!("mmap {}: {}", path.display(), std::io::Error::last_os_error());
        }

        Ok(Image {
            base: addr.cast(),
            len,
        })
    }

    pub fn start_address(&self) -> usize {
        self.base as usize
    }

    /// The mapping's end, for bounds-checking a trapped PC against the
    /// image before trusting it as an offset (defensive; the original
    /// never needs this because it never receives a foreign PC).
    pub fn end_address(&self) -> usize {
        self.base as usize + self.len
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base.cast(), self.len);
        }
    }
}

/// Jumps into the image and runs it as a bare function. Only returns if
/// the image itself returns, which every checkpoint-driven test ends
/// before doing (spec.md §4.1: control leaves only via the trap handler's
/// `siglongjmp`, never a normal return).
///
/// # Safety
/// `image` must contain a valid entrypoint at offset 0 for the host ISA,
/// and the signal handler that will intercept its checkpoint traps must
/// already be installed.
pub unsafe fn run_image(image: &Image) {
    let entry: extern "C" fn() = std::mem::transmute(image.start_address());
    entry();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_and_maps_a_file_of_the_right_size() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0xC3u8; 64]).unwrap(); // ret ret ret ...
        let image = Image::load(file.path()).unwrap();
        assert_eq!(image.end_address() - image.start_address(), 64);
    }

    #[test]
    fn rejects_an_empty_image() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(Image::load(file.path()).is_err());
    }
}
