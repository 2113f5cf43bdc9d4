use std::fmt;

use bytes::Bytes;

use crate::pool::{Pool, Recycle};

/// An ordered list of tags referencing the packet they were parsed from.
///
/// Tags parsed from a packet are zero-copy slices of the packet buffer; the buffer stays alive as
/// long as any of its tags is held. Tags appended during enrichment own their bytes. Duplicates
/// are allowed and order is preserved.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    tags: Vec<Bytes>,
}

impl TagSet {
    /// Returns the number of tags.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Returns `true` if there are no tags.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Iterates the raw tag bytes in order.
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.tags.iter().map(|tag| &tag[..])
    }

    /// Appends a single tag.
    pub fn push(&mut self, tag: impl Into<Bytes>) {
        self.tags.push(tag.into());
    }

    /// Appends owned tags, such as tags resolved from the tag catalog.
    pub fn extend_owned(&mut self, tags: Vec<String>) {
        self.tags.extend(tags.into_iter().map(Bytes::from));
    }

    /// Appends the comma-separated tags in `field`, skipping empty entries.
    ///
    /// `field` must be a subslice of `packet`; the tags reference the packet without copying.
    pub(crate) fn extend_from_field(&mut self, packet: &Bytes, field: &str) {
        for tag in field.split(',').filter(|tag| !tag.is_empty()) {
            self.tags.push(packet.slice_ref(tag.as_bytes()));
        }
    }

    /// Removes the tag at `index`, shifting subsequent tags to the left.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn remove(&mut self, index: usize) -> Bytes {
        self.tags.remove(index)
    }

    /// Removes all tags.
    pub fn clear(&mut self) {
        self.tags.clear();
    }

    /// Keeps only the tags for which `keep` returns `true`, in a single pass.
    ///
    /// Retained tags are swapped forward over removed ones and the tail is truncated. Order of
    /// retained tags is preserved and no reallocation happens.
    pub fn retain_with<F>(&mut self, mut keep: F)
    where
        F: FnMut(&Bytes) -> bool,
    {
        let mut write = 0;
        for read in 0..self.tags.len() {
            if keep(&self.tags[read]) {
                if read != write {
                    self.tags.swap(write, read);
                }
                write += 1;
            }
        }
        self.tags.truncate(write);
    }

    /// Copies the tags into owned strings.
    pub fn to_strings(&self) -> Vec<String> {
        self.iter()
            .map(|tag| String::from_utf8_lossy(tag).into_owned())
            .collect()
    }
}

impl Recycle for TagSet {
    fn recycle(&mut self) {
        self.clear();
    }
}

impl fmt::Debug for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.iter().map(String::from_utf8_lossy))
            .finish()
    }
}

/// Creates the shared pool of tag containers.
pub fn tag_pool(max_idle: usize) -> Pool<TagSet> {
    Pool::new("tags", max_idle, TagSet::default)
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    fn tag_set(tags: &[&'static str]) -> TagSet {
        let mut set = TagSet::default();
        for tag in tags {
            set.push(*tag);
        }
        set
    }

    #[test]
    fn test_extend_from_field_is_zero_copy() {
        let packet = Bytes::from_static(b"name:1|c|#a:1,,b,c:3");
        let field = std::str::from_utf8(&packet[10..]).unwrap();

        let mut tags = TagSet::default();
        tags.extend_from_field(&packet, field);

        assert_eq!(tags.to_strings(), ["a:1", "b", "c:3"]);
        let start = packet.as_ptr() as usize;
        let end = start + packet.len();
        for tag in tags.iter() {
            let ptr = tag.as_ptr() as usize;
            assert!(ptr >= start && ptr < end);
        }
    }

    #[test]
    fn test_retain_with_compacts_in_place() {
        let mut tags = tag_set(&["host:a", "env:prod", "host:b", "team:x", "region:eu"]);
        let capacity = tags.tags.capacity();

        tags.retain_with(|tag| !tag.starts_with(b"host:"));

        assert_eq!(tags.to_strings(), ["env:prod", "team:x", "region:eu"]);
        assert_eq!(tags.tags.capacity(), capacity);
    }

    #[test]
    fn test_retain_with_visits_in_order() {
        let mut tags = tag_set(&["a", "b", "c"]);
        let mut seen = Vec::new();
        tags.retain_with(|tag| {
            seen.push(tag.clone());
            false
        });

        assert!(tags.is_empty());
        assert_eq!(seen, ["a", "b", "c"]);
    }

    #[test]
    fn test_remove_and_extend() {
        let mut tags = tag_set(&["a", "b", "a"]);
        assert_eq!(tags.remove(1), "b");
        tags.extend_owned(vec!["pod:web".to_owned()]);
        assert_eq!(tags.to_strings(), ["a", "a", "pod:web"]);
    }

    #[test]
    fn test_pooled_tags_are_recycled() {
        let pool = tag_pool(1);
        let mut tags = pool.get();
        tags.push("a:b");
        drop(tags);

        assert!(pool.get().is_empty());
    }
}
