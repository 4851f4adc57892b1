use crate::common::{PageDbError, PageId, Result, INVALID_PAGE_ID, PAGE_SIZE};

/// Longest index name the directory can hold
pub const MAX_INDEX_NAME_LEN: usize = 32;

const ROOT_OFFSET: usize = 0;
const NAME_LEN_OFFSET: usize = 4;
const NAME_OFFSET: usize = 5;

/// root_page_id (4) + name_len (1) + name (32)
const SLOT_SIZE: usize = NAME_OFFSET + MAX_INDEX_NAME_LEN;

/// Number of indexes one store can hold
pub const MAX_INDEXES: usize = PAGE_SIZE / SLOT_SIZE;

fn slot_offset(slot: usize) -> usize {
    slot * SLOT_SIZE
}

fn slot_name(data: &[u8], slot: usize) -> &[u8] {
    let offset = slot_offset(slot);
    let len = (data[offset + NAME_LEN_OFFSET] as usize).min(MAX_INDEX_NAME_LEN);
    &data[offset + NAME_OFFSET..offset + NAME_OFFSET + len]
}

fn find_slot(data: &[u8], name: &str) -> Option<usize> {
    (0..MAX_INDEXES).find(|&slot| {
        let stored = slot_name(data, slot);
        !stored.is_empty() && stored == name.as_bytes()
    })
}

fn root_at(data: &[u8], slot: usize) -> Option<PageId> {
    let offset = slot_offset(slot) + ROOT_OFFSET;
    let raw = i32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ]);
    if raw < 0 {
        None
    } else {
        Some(PageId::new(raw))
    }
}

/// Checks that `name` can be stored in a directory slot.
pub fn validate_index_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_INDEX_NAME_LEN {
        return Err(PageDbError::InvalidConfig(format!(
            "index name must be 1..={} bytes, got {}",
            MAX_INDEX_NAME_LEN,
            name.len()
        )));
    }
    Ok(())
}

/// Read-only view of the root directory stored in page 0.
///
/// Page 0 is an array of fixed-size slots, one per named index:
/// `root_page_id` (4 bytes, big-endian, -1 for an empty tree), `name_len`
/// (1 byte, 0 marks a free slot) and the name padded to 32 bytes. Slot 0
/// starts at offset 0, so a single-index store keeps its root page id in the
/// first four bytes of the file.
pub struct RootDirectoryRef<'a> {
    data: &'a [u8; PAGE_SIZE],
}

impl<'a> RootDirectoryRef<'a> {
    pub fn new(data: &'a [u8; PAGE_SIZE]) -> Self {
        Self { data }
    }

    /// Slot registered under `name`.
    pub fn find(&self, name: &str) -> Option<usize> {
        find_slot(self.data, name)
    }

    pub fn root_page_id(&self, slot: usize) -> Option<PageId> {
        root_at(self.data, slot)
    }

    /// All registered `(name, root)` pairs in slot order.
    pub fn entries(&self) -> Vec<(String, Option<PageId>)> {
        (0..MAX_INDEXES)
            .filter_map(|slot| {
                let name = slot_name(self.data, slot);
                (!name.is_empty()).then(|| {
                    (
                        String::from_utf8_lossy(name).into_owned(),
                        root_at(self.data, slot),
                    )
                })
            })
            .collect()
    }
}

/// Mutable view of the root directory stored in page 0.
pub struct RootDirectory<'a> {
    data: &'a mut [u8; PAGE_SIZE],
}

impl<'a> RootDirectory<'a> {
    pub fn new(data: &'a mut [u8; PAGE_SIZE]) -> Self {
        Self { data }
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        find_slot(self.data, name)
    }

    /// Claims the first free slot for `name` with an empty root and returns
    /// it. Returns the existing slot if the name is already registered.
    pub fn register(&mut self, name: &str) -> Result<usize> {
        validate_index_name(name)?;

        if let Some(slot) = self.find(name) {
            return Ok(slot);
        }

        let slot = (0..MAX_INDEXES)
            .find(|&slot| slot_name(self.data, slot).is_empty())
            .ok_or(PageDbError::DirectoryFull)?;

        let offset = slot_offset(slot);
        self.data[offset + NAME_LEN_OFFSET] = name.len() as u8;
        self.data[offset + NAME_OFFSET..offset + NAME_OFFSET + MAX_INDEX_NAME_LEN].fill(0);
        self.data[offset + NAME_OFFSET..offset + NAME_OFFSET + name.len()]
            .copy_from_slice(name.as_bytes());
        self.set_root_page_id(slot, None);

        Ok(slot)
    }

    pub fn set_root_page_id(&mut self, slot: usize, root: Option<PageId>) {
        let offset = slot_offset(slot) + ROOT_OFFSET;
        let raw = root.unwrap_or(INVALID_PAGE_ID).as_i32();
        self.data[offset..offset + 4].copy_from_slice(&raw.to_be_bytes());
    }
}
