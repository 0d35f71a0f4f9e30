use crate::errors::MapFileError;
use crate::reader::read_string_from_pool;
use crate::types::Tag;

/// Sink for decoded map features, driven directly from `MapFile::execute_query`.
///
/// `coords` and `tags` are borrows into decoder-owned scratch storage,
/// valid only for the duration of the callback invocation - a consumer
/// that needs to retain them must copy. Way name/house-number/ref strings
/// are resolved through `read_string` at decode time and arrive already
/// embedded in `tags`; POI strings are always inline (no pool exists yet
/// when the POI sequence of a block is read).
pub trait TileCallback {
    /// `lat`/`lon` are microdegrees (degrees × 1,000,000), matching the
    /// on-disk encoding; multiply by 1e-6 for plain degrees.
    fn render_point_of_interest(&mut self, layer: i8, lat: i32, lon: i32, tags: &[Tag]);

    /// `coords` is interleaved `(lon, lat)` f32 pairs across every
    /// coordinate block of the way; `lengths[i]` is the pair count of
    /// block `i`, in order. `tags_changed` is false when this way's
    /// decoded tags equal the last tag array decoded in this block
    /// (including one replayed from a way `skip_ways` fast-forwarded
    /// past), letting a run of identically-tagged ways share one `Vec<Tag>`.
    fn render_way(
        &mut self,
        layer: i8,
        tags: &[Tag],
        coords: &[f32],
        lengths: &[i32],
        tags_changed: bool,
    );

    /// Resolves a way string reference - a byte offset into the current
    /// block's way-string pool - to its UTF-8 text. `pool` is the raw
    /// way-strings block captured once per block by `process_ways` before
    /// the way sequence. The default implementation decodes the same
    /// VBE-U-length-prefixed format `ReadBuffer` uses elsewhere; override
    /// to intercept or cache resolved strings.
    fn read_string(&self, pool: &[u8], offset: i32) -> Result<String, MapFileError> {
        read_string_from_pool(pool, offset)
    }
}
