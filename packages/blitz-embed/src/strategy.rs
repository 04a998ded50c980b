use blitz_embed_traits::{ContextCaps, SurfaceStrategy, TextureFlags};

/// Decide how frames produced by a context with `caps` are shared with the consumer.
///
/// Contexts that can export platform image handles share them directly; everything else goes
/// through a shared texture copy. Orientation and alpha interpretation travel with the choice
/// either way.
pub fn select(caps: ContextCaps) -> SurfaceStrategy {
    let mut flags = TextureFlags::empty();
    if caps.contains(ContextCaps::ORIGIN_BOTTOM_LEFT) {
        flags |= TextureFlags::ORIGIN_BOTTOM_LEFT;
    }
    if !caps.contains(ContextCaps::PREMULTIPLIED_ALPHA) {
        flags |= TextureFlags::NON_PREMULTIPLIED;
    }

    if caps.contains(ContextCaps::IMAGE_EXPORT) {
        SurfaceStrategy::DirectImageShare(flags)
    } else {
        SurfaceStrategy::TextureCopyShare(flags)
    }
}
