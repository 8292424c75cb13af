//! Moving whole images between the pool buffer and a device.

use nvtree_codec::{CodecError, TableHeader, TABLE_HEADER_SIZE};
use nvtree_store::{Backend, BusMode, FlashProbe, StoreError};
use tracing::debug;

use crate::error::SessionResult;

/// Bytes fetched first: enough for the header and small images.
const HEADER_PAGE: usize = 256;
/// Burst reads must cover whole 16-byte lines.
const READ_ALIGN: usize = 16;

/// Read the image at `base` into `pool`: header first, then the stored
/// payload in chunk-sized, line-aligned reads.
///
/// Returns the decoded header. The payload is not verified here.
pub(crate) fn read_image(
    dev: &mut dyn Backend,
    base: u32,
    chunk: u32,
    pool: &mut [u8],
) -> SessionResult<TableHeader> {
    let device_room = dev.geometry().capacity.saturating_sub(base) as usize;
    let window = pool.len().min(device_room);
    let first = HEADER_PAGE.min(window);
    if first < TABLE_HEADER_SIZE {
        return Err(CodecError::BufferTooSmall {
            needed: TABLE_HEADER_SIZE,
            available: first,
        }
        .into());
    }
    dev.read(base, &mut pool[..first])?;
    let header = TableHeader::decode(&pool[..TABLE_HEADER_SIZE])?;

    let limit = (pool.len() - TABLE_HEADER_SIZE) as u32;
    for len in [header.total_len, header.stored_len()] {
        if len > limit {
            return Err(CodecError::TooLarge { len, limit }.into());
        }
    }

    let end = TABLE_HEADER_SIZE + header.stored_len() as usize;
    if end > window {
        return Err(CodecError::TooLarge {
            len: header.stored_len(),
            limit: (window - TABLE_HEADER_SIZE) as u32,
        }
        .into());
    }
    let mut pos = first;
    while pos < end {
        let want = (end - pos).min(chunk as usize);
        let aligned = want.div_ceil(READ_ALIGN) * READ_ALIGN;
        let len = aligned.min(window - pos);
        dev.read(base + pos as u32, &mut pool[pos..pos + len])?;
        pos += len;
    }
    debug!(
        base,
        total = header.total_len,
        stored = header.stored_len(),
        "image read"
    );
    Ok(header)
}

/// Program `image` at `base`, one erase-then-write step per chunk.
///
/// Steps are the chunk rounded up to whole erase sectors, so no step
/// erases bytes an earlier one wrote. Serial parts are switched to the
/// safe bus mode and unprotected for the duration; both are restored even
/// when a step fails.
pub(crate) fn commit_image(
    dev: &mut dyn Backend,
    base: u32,
    chunk: u32,
    probe: FlashProbe,
    image: &[u8],
) -> SessionResult<()> {
    let step = erase_span(dev, chunk);
    check_base(dev, base, step)?;
    with_unprotected(dev, probe, |dev| {
        let write_mode = probe.write_mode();
        for (i, piece) in image.chunks(step as usize).enumerate() {
            let offset = base + (i as u32) * step;
            dev.erase(offset, step)?;
            if write_mode != BusMode::Single {
                dev.set_bus_mode(write_mode)?;
            }
            let written = dev.write(offset, piece);
            if write_mode != BusMode::Single {
                dev.set_bus_mode(BusMode::Single)?;
            }
            written?;
        }
        debug!(base, bytes = image.len(), "image committed");
        Ok(())
    })
}

/// Erase `len` bytes at `base`, rounded up to whole chunks.
pub(crate) fn erase_region(
    dev: &mut dyn Backend,
    base: u32,
    chunk: u32,
    probe: FlashProbe,
    len: u32,
) -> SessionResult<()> {
    let step = erase_span(dev, chunk);
    check_base(dev, base, step)?;
    with_unprotected(dev, probe, |dev| {
        for i in 0..len.div_ceil(step) {
            dev.erase(base + i * step, step)?;
        }
        debug!(base, len, "region erased");
        Ok(())
    })
}

/// Chunk size rounded up to the device's erase granularity.
fn erase_span(dev: &dyn Backend, chunk: u32) -> u32 {
    let granule = dev.geometry().erase_size.max(1);
    chunk.div_ceil(granule) * granule
}

/// An image must start on an erase boundary.
fn check_base(dev: &dyn Backend, base: u32, step: u32) -> SessionResult<()> {
    let granule = dev.geometry().erase_size.max(1);
    if base % granule != 0 {
        return Err(StoreError::Misaligned {
            offset: base,
            len: step,
            align: granule,
        }
        .into());
    }
    Ok(())
}

fn with_unprotected<F>(dev: &mut dyn Backend, probe: FlashProbe, body: F) -> SessionResult<()>
where
    F: FnOnce(&mut dyn Backend) -> SessionResult<()>,
{
    dev.set_bus_mode(BusMode::Single)?;
    dev.set_write_protect(false)?;
    let result = body(&mut *dev);
    let restored = dev
        .set_write_protect(true)
        .and_then(|()| dev.set_bus_mode(probe.read_mode()));
    result?;
    restored?;
    Ok(())
}
