//! PE32 / PE32+ executables - resource, version info and debug directory
//! walker.
//!
//! ## Layout
//! ```text
//! [0x00]     DOS header "MZ"       (0x40 bytes, e_lfanew at 0x3C)
//! [e_lfanew] Signature "PE\0\0"    (4 bytes)
//!            COFF header           (0x14 bytes)
//!            Optional header       (0x60 / 0x70 bytes + data directories)
//!            Section table         (NumberOfSections × 0x28 bytes)
//! ```
//!
//! The optional header comes in two shapes selected by its magic: 0x10B
//! (PE32) and 0x20B (PE32+). Both are modelled by [`OptionalHeader`].
//!
//! [`PeArchive`] computes its derived tables on first use and keeps them for
//! the handle's lifetime: the resource cache ([`resource::walk_resources`]),
//! the debug cache ([`debug::walk_debug`]), raw section data and raw
//! data-directory tables. Each cache is a [`OnceLock`], so concurrent
//! callers see one computation.
//!
//! Resource leaves are also exposed through [`Extract`], one entry per leaf,
//! written as `{type}/{name}/{language}.bin`.

pub mod debug;
pub mod manifest;
pub mod resource;
pub mod typed;
pub mod version;

use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::OnceLock;

use bitflags::bitflags;
use tracing::{debug, warn};

use self::debug::{DebugCache, parse_debug_directory, walk_debug};
use self::resource::{ResourceCache, ResourceDataEntry, ResourceKey, ResourceTree, walk_resources};
use super::{Extract, ExtractedEntry, archive_constructors, check_index};
use crate::source::Source;
use crate::utils::{bytesa, fixed_string, le_u16, le_u32, le_u64, magic, u8};
use crate::{Error, Result};

pub const PE32_MAGIC: u16 = 0x010B;
pub const PE32_PLUS_MAGIC: u16 = 0x020B;

/// Data directory indices.
pub const DIRECTORY_EXPORT: usize = 0;
pub const DIRECTORY_IMPORT: usize = 1;
pub const DIRECTORY_RESOURCE: usize = 2;
pub const DIRECTORY_EXCEPTION: usize = 3;
pub const DIRECTORY_SECURITY: usize = 4;
pub const DIRECTORY_BASERELOC: usize = 5;
pub const DIRECTORY_DEBUG: usize = 6;

const MAX_DATA_DIRECTORIES: u32 = 16;

bitflags! {
    /// COFF header characteristics.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Characteristics: u16 {
        const RELOCS_STRIPPED = 0x0001;
        const EXECUTABLE_IMAGE = 0x0002;
        const LARGE_ADDRESS_AWARE = 0x0020;
        const MACHINE_32BIT = 0x0100;
        const DEBUG_STRIPPED = 0x0200;
        const SYSTEM = 0x1000;
        const DLL = 0x2000;
    }
}

bitflags! {
    /// Section header characteristics.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SectionFlags: u32 {
        const CODE = 0x0000_0020;
        const INITIALIZED_DATA = 0x0000_0040;
        const UNINITIALIZED_DATA = 0x0000_0080;
        const DISCARDABLE = 0x0200_0000;
        const SHARED = 0x1000_0000;
        const EXECUTE = 0x2000_0000;
        const READ = 0x4000_0000;
        const WRITE = 0x8000_0000;
    }
}

/// Target machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Machine {
    I386,
    Amd64,
    Arm,
    Arm64,
    Ia64,
    Unknown(u16),
}

impl From<u16> for Machine {
    fn from(v: u16) -> Self {
        match v {
            0x014C => Self::I386,
            0x8664 => Self::Amd64,
            0x01C0 | 0x01C4 => Self::Arm,
            0xAA64 => Self::Arm64,
            0x0200 => Self::Ia64,
            x => Self::Unknown(x),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoffHeader {
    pub machine: Machine,
    pub section_count: u16,
    pub time_date_stamp: u32,
    pub symbol_table_offset: u32,
    pub symbol_count: u32,
    pub optional_header_size: u16,
    pub characteristics: Characteristics,
}

/// Optional-header fields with the same width in PE32 and PE32+.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionalCommon {
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub size_of_code: u32,
    pub size_of_initialized_data: u32,
    pub size_of_uninitialized_data: u32,
    pub address_of_entry_point: u32,
    pub base_of_code: u32,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub os_version: (u16, u16),
    pub image_version: (u16, u16),
    pub subsystem_version: (u16, u16),
    pub win32_version_value: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub checksum: u32,
    pub subsystem: u16,
    pub dll_characteristics: u16,
    pub loader_flags: u32,
    pub number_of_rva_and_sizes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionalHeader {
    Pe32 {
        common: OptionalCommon,
        base_of_data: u32,
        image_base: u32,
        stack_reserve: u32,
        stack_commit: u32,
        heap_reserve: u32,
        heap_commit: u32,
    },
    Pe32Plus {
        common: OptionalCommon,
        image_base: u64,
        stack_reserve: u64,
        stack_commit: u64,
        heap_reserve: u64,
        heap_commit: u64,
    },
}

impl OptionalHeader {
    pub fn common(&self) -> &OptionalCommon {
        match self {
            Self::Pe32 { common, .. } | Self::Pe32Plus { common, .. } => common,
        }
    }

    pub fn image_base(&self) -> u64 {
        match *self {
            Self::Pe32 { image_base, .. } => image_base as u64,
            Self::Pe32Plus { image_base, .. } => image_base,
        }
    }

    pub fn is_pe32_plus(&self) -> bool {
        matches!(self, Self::Pe32Plus { .. })
    }

    fn parse<R: Read>(r: &mut R) -> Result<Self> {
        let magic = le_u16(r)?;
        let plus = match magic {
            PE32_MAGIC => false,
            PE32_PLUS_MAGIC => true,
            _ => return Err(Error::BadMagic),
        };
        // Fields wider in PE32+.
        let wide = |r: &mut R| -> Result<u64> {
            if plus { le_u64(r) } else { le_u32(r).map(u64::from) }
        };

        let major_linker_version = u8(r)?;
        let minor_linker_version = u8(r)?;
        let size_of_code = le_u32(r)?;
        let size_of_initialized_data = le_u32(r)?;
        let size_of_uninitialized_data = le_u32(r)?;
        let address_of_entry_point = le_u32(r)?;
        let base_of_code = le_u32(r)?;
        let base_of_data = if plus { 0 } else { le_u32(r)? };
        let image_base = wide(r)?;
        let section_alignment = le_u32(r)?;
        let file_alignment = le_u32(r)?;
        let os_version = (le_u16(r)?, le_u16(r)?);
        let image_version = (le_u16(r)?, le_u16(r)?);
        let subsystem_version = (le_u16(r)?, le_u16(r)?);
        let win32_version_value = le_u32(r)?;
        let size_of_image = le_u32(r)?;
        let size_of_headers = le_u32(r)?;
        let checksum = le_u32(r)?;
        let subsystem = le_u16(r)?;
        let dll_characteristics = le_u16(r)?;
        let stack_reserve = wide(r)?;
        let stack_commit = wide(r)?;
        let heap_reserve = wide(r)?;
        let heap_commit = wide(r)?;
        let loader_flags = le_u32(r)?;
        let number_of_rva_and_sizes = le_u32(r)?;

        let common = OptionalCommon {
            major_linker_version,
            minor_linker_version,
            size_of_code,
            size_of_initialized_data,
            size_of_uninitialized_data,
            address_of_entry_point,
            base_of_code,
            section_alignment,
            file_alignment,
            os_version,
            image_version,
            subsystem_version,
            win32_version_value,
            size_of_image,
            size_of_headers,
            checksum,
            subsystem,
            dll_characteristics,
            loader_flags,
            number_of_rva_and_sizes,
        };

        Ok(if plus {
            Self::Pe32Plus {
                common,
                image_base,
                stack_reserve,
                stack_commit,
                heap_reserve,
                heap_commit,
            }
        } else {
            // PE32 wide fields were read as u32.
            Self::Pe32 {
                common,
                base_of_data,
                image_base: image_base as u32,
                stack_reserve: stack_reserve as u32,
                stack_commit: stack_commit as u32,
                heap_reserve: heap_reserve as u32,
                heap_commit: heap_commit as u32,
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataDirectory {
    pub virtual_address: u32,
    pub size: u32,
}

impl DataDirectory {
    pub fn is_present(&self) -> bool {
        self.virtual_address != 0 && self.size != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub size_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
    pub pointer_to_relocations: u32,
    pub pointer_to_linenumbers: u32,
    pub number_of_relocations: u16,
    pub number_of_linenumbers: u16,
    pub characteristics: SectionFlags,
}

impl Section {
    fn contains_rva(&self, rva: u32) -> bool {
        let extent = self.virtual_size.max(self.size_of_raw_data) as u64;
        let start = self.virtual_address as u64;
        (start..start + extent).contains(&(rva as u64))
    }
}

/// Parsed PE headers.
#[derive(Debug)]
pub struct Pe {
    pub e_lfanew: u32,
    pub coff: CoffHeader,
    pub optional: OptionalHeader,
    pub data_directories: Vec<DataDirectory>,
    pub sections: Vec<Section>,
}

impl Pe {
    pub fn parse<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let base = r.stream_position()?;
        magic(r, b"MZ")?;
        r.seek(SeekFrom::Start(base + 0x3C))?;
        let e_lfanew = le_u32(r)?;
        r.seek(SeekFrom::Start(base + e_lfanew as u64))?;
        magic(r, b"PE\0\0")?;

        let coff = CoffHeader {
            machine: Machine::from(le_u16(r)?),
            section_count: le_u16(r)?,
            time_date_stamp: le_u32(r)?,
            symbol_table_offset: le_u32(r)?,
            symbol_count: le_u32(r)?,
            optional_header_size: le_u16(r)?,
            characteristics: Characteristics::from_bits_retain(le_u16(r)?),
        };
        let optional_start = r.stream_position()?;
        let optional = OptionalHeader::parse(r)?;

        let count = optional
            .common()
            .number_of_rva_and_sizes
            .min(MAX_DATA_DIRECTORIES);
        let mut data_directories = Vec::with_capacity(count as usize);
        for _ in 0..count {
            data_directories.push(DataDirectory {
                virtual_address: le_u32(r)?,
                size: le_u32(r)?,
            });
        }

        r.seek(SeekFrom::Start(
            optional_start + coff.optional_header_size as u64,
        ))?;
        let mut sections = Vec::with_capacity(coff.section_count as usize);
        for _ in 0..coff.section_count {
            sections.push(Section {
                name: fixed_string(&bytesa::<8>(r)?),
                virtual_size: le_u32(r)?,
                virtual_address: le_u32(r)?,
                size_of_raw_data: le_u32(r)?,
                pointer_to_raw_data: le_u32(r)?,
                pointer_to_relocations: le_u32(r)?,
                pointer_to_linenumbers: le_u32(r)?,
                number_of_relocations: le_u16(r)?,
                number_of_linenumbers: le_u16(r)?,
                characteristics: SectionFlags::from_bits_retain(le_u32(r)?),
            });
        }

        Ok(Self {
            e_lfanew,
            coff,
            optional,
            data_directories,
            sections,
        })
    }

    /// Map a relative virtual address to a file offset.
    ///
    /// Addresses inside the headers map to themselves.
    pub fn rva_to_offset(&self, rva: u32) -> Option<u64> {
        if rva < self.optional.common().size_of_headers {
            return Some(rva as u64);
        }
        let section = self.sections.iter().find(|s| s.contains_rva(rva))?;
        let delta = rva - section.virtual_address;
        if delta >= section.size_of_raw_data {
            // Zero-fill tail; not backed by file data.
            return None;
        }
        Some(section.pointer_to_raw_data as u64 + delta as u64)
    }

    pub fn data_directory(&self, index: usize) -> Option<DataDirectory> {
        self.data_directories
            .get(index)
            .copied()
            .filter(DataDirectory::is_present)
    }
}

/// One extractable resource leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLeaf {
    pub path: Vec<ResourceKey>,
    pub entry: ResourceDataEntry,
}

impl ResourceLeaf {
    /// `{type}/{name}/{language}.bin`, known types by their `RT_*` name.
    pub fn output_path(&self) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(self.path.len());
        for (depth, key) in self.path.iter().enumerate() {
            parts.push(match (depth, key) {
                (0, ResourceKey::Id(id)) => resource::type_name(*id)
                    .map(str::to_owned)
                    .unwrap_or_else(|| id.to_string()),
                _ => key.to_string(),
            });
        }
        format!("{}.bin", parts.join("/"))
    }
}

/// PE image handle with lazily computed derived tables.
pub struct PeArchive<R> {
    source: Source<R>,
    pub pe: Pe,
    resource_tree: OnceLock<ResourceTree>,
    leaves: OnceLock<Vec<ResourceLeaf>>,
    resources: OnceLock<ResourceCache>,
    debug: OnceLock<DebugCache>,
    section_data: Vec<OnceLock<Option<Vec<u8>>>>,
    directory_data: Vec<OnceLock<Option<Vec<u8>>>>,
}

impl<R: Read + Seek> PeArchive<R> {
    pub fn from_source(source: Source<R>) -> Result<Self> {
        let pe = source.parse_with(Pe::parse)?;
        debug!(
            machine = ?pe.coff.machine,
            pe32_plus = pe.optional.is_pe32_plus(),
            sections = pe.sections.len(),
            "parsed pe headers"
        );
        let section_data = pe.sections.iter().map(|_| OnceLock::new()).collect();
        let directory_data = pe.data_directories.iter().map(|_| OnceLock::new()).collect();
        Ok(Self {
            source,
            pe,
            resource_tree: OnceLock::new(),
            leaves: OnceLock::new(),
            resources: OnceLock::new(),
            debug: OnceLock::new(),
            section_data,
            directory_data,
        })
    }

    /// Raw bytes of section `index`, read once.
    pub fn section_data(&self, index: usize) -> Option<&[u8]> {
        let section = self.pe.sections.get(index)?;
        self.section_data[index]
            .get_or_init(|| {
                self.source
                    .read_range(
                        section.pointer_to_raw_data as u64,
                        section.size_of_raw_data as u64,
                    )
                    .map_err(|e| warn!(section = %section.name, error = %e, "section unreadable"))
                    .ok()
            })
            .as_deref()
    }

    /// Raw table bytes of data directory `index`, read once.
    pub fn directory_data(&self, index: usize) -> Option<&[u8]> {
        let dir = self.pe.data_directory(index)?;
        self.directory_data[index]
            .get_or_init(|| {
                let read = match self.pe.rva_to_offset(dir.virtual_address) {
                    Some(offset) => self.source.read_range(offset, dir.size as u64),
                    None => Err(Error::InvalidRange),
                };
                read.map_err(|e| warn!(index, error = %e, "data directory unreadable"))
                    .ok()
            })
            .as_deref()
    }

    /// Bytes at `rva`, `len` long.
    pub fn read_rva(&self, rva: u32, len: u32) -> Result<Vec<u8>> {
        let offset = self.pe.rva_to_offset(rva).ok_or(Error::InvalidRange)?;
        self.source.read_range(offset, len as u64)
    }

    /// The resource directory tree; empty when the image has none.
    pub fn resource_tree(&self) -> &ResourceTree {
        self.resource_tree.get_or_init(|| {
            match self.directory_data(DIRECTORY_RESOURCE) {
                Some(data) => ResourceTree::parse(data).unwrap_or_else(|e| {
                    warn!(error = %e, "resource directory unreadable");
                    ResourceTree::default()
                }),
                None => ResourceTree::default(),
            }
        })
    }

    pub fn resource_leaves(&self) -> &[ResourceLeaf] {
        self.leaves.get_or_init(|| {
            self.resource_tree()
                .leaves()
                .into_iter()
                .map(|(path, entry)| ResourceLeaf { path, entry })
                .collect()
        })
    }

    /// Decoded resources, keyed by their `", "` joined path.
    pub fn resources(&self) -> &ResourceCache {
        self.resources.get_or_init(|| {
            walk_resources(self.resource_tree(), |entry| {
                self.read_rva(entry.data_rva, entry.size)
            })
        })
    }

    /// Last version info resource in walk order.
    pub fn version_info(&self) -> Option<&version::VersionInfo> {
        self.resources().version.as_ref()
    }

    /// Last assembly manifest in walk order.
    pub fn manifest(&self) -> Option<&manifest::AssemblyManifest> {
        self.resources().manifest.as_ref()
    }

    /// Debug directory entries and their decoded data.
    pub fn debug_info(&self) -> &DebugCache {
        self.debug.get_or_init(|| {
            let entries = match self.directory_data(DIRECTORY_DEBUG) {
                Some(data) => parse_debug_directory(data).unwrap_or_else(|e| {
                    warn!(error = %e, "debug directory unreadable");
                    Vec::new()
                }),
                None => Vec::new(),
            };
            walk_debug(entries, |entry| {
                self.source
                    .read_range(entry.pointer_to_raw_data as u64, entry.size_of_data as u64)
            })
        })
    }

    /// Dump every resource leaf below `out_dir` as
    /// `{type}/{name}/{language}.bin`.
    pub fn extract_resources(&self, out_dir: &Path) -> bool {
        debug!(leaves = self.resource_leaves().len(), "dumping pe resources");
        self.extract_all(out_dir)
    }
}

archive_constructors!(PeArchive);

impl<R: Read + Seek> Extract for PeArchive<R> {
    fn entry_count(&self) -> usize {
        self.resource_leaves().len()
    }

    fn read_entry(&self, index: usize) -> Result<ExtractedEntry> {
        check_index(index, self.entry_count())?;
        let leaf = &self.resource_leaves()[index];
        debug!(
            index,
            rva = leaf.entry.data_rva,
            size = leaf.entry.size,
            "pe resource"
        );
        let data = self.read_rva(leaf.entry.data_rva, leaf.entry.size)?;
        Ok(ExtractedEntry::new(leaf.output_path(), data))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    /// Minimal PE32 image: headers in the first 0x200 bytes, one `.rsrc`
    /// section at RVA 0x1000 / file offset 0x200 holding `rsrc`.
    pub(crate) fn image(plus: bool, rsrc: &[u8], debug: Option<(u32, u32)>) -> Vec<u8> {
        let mut out = vec![0u8; 0x200];
        out[0..2].copy_from_slice(b"MZ");
        out[0x3C..0x40].copy_from_slice(&0x40u32.to_le_bytes());

        let mut h = b"PE\0\0".to_vec();
        let optional_size: u16 = if plus { 0xF0 } else { 0xE0 };
        h.extend_from_slice(&0x014Cu16.to_le_bytes());
        h.extend_from_slice(&1u16.to_le_bytes());
        h.extend_from_slice(&[0; 12]);
        h.extend_from_slice(&optional_size.to_le_bytes());
        h.extend_from_slice(&0x0102u16.to_le_bytes());

        let opt_start = h.len();
        h.extend_from_slice(&(if plus { PE32_PLUS_MAGIC } else { PE32_MAGIC }).to_le_bytes());
        h.extend_from_slice(&[14, 0]);
        h.extend_from_slice(&[0; 20]);
        if !plus {
            h.extend_from_slice(&0u32.to_le_bytes());
        }
        if plus {
            h.extend_from_slice(&0x1_4000_0000u64.to_le_bytes());
        } else {
            h.extend_from_slice(&0x40_0000u32.to_le_bytes());
        }
        h.extend_from_slice(&0x1000u32.to_le_bytes());
        h.extend_from_slice(&0x200u32.to_le_bytes());
        h.extend_from_slice(&[0; 16]);
        h.extend_from_slice(&0x2000u32.to_le_bytes());
        h.extend_from_slice(&0x200u32.to_le_bytes());
        h.extend_from_slice(&[0; 8]);
        h.extend_from_slice(&[0; 4 * 8][..if plus { 32 } else { 16 }]);
        h.extend_from_slice(&0u32.to_le_bytes());
        h.extend_from_slice(&16u32.to_le_bytes());
        for i in 0..16 {
            let (rva, size) = match i {
                DIRECTORY_RESOURCE => (0x1000, rsrc.len() as u32),
                DIRECTORY_DEBUG => debug.unwrap_or((0, 0)),
                _ => (0, 0),
            };
            h.extend_from_slice(&rva.to_le_bytes());
            h.extend_from_slice(&size.to_le_bytes());
        }
        assert_eq!(h.len() - opt_start, optional_size as usize);

        let raw_size = (rsrc.len() as u32).div_ceil(0x200) * 0x200;
        h.extend_from_slice(b".rsrc\0\0\0");
        h.extend_from_slice(&(rsrc.len() as u32).to_le_bytes());
        h.extend_from_slice(&0x1000u32.to_le_bytes());
        h.extend_from_slice(&raw_size.to_le_bytes());
        h.extend_from_slice(&0x200u32.to_le_bytes());
        h.extend_from_slice(&[0; 12]);
        h.extend_from_slice(&0x4000_0040u32.to_le_bytes());

        out[0x40..0x40 + h.len()].copy_from_slice(&h);
        out.extend_from_slice(rsrc);
        out.resize(0x200 + raw_size as usize, 0);
        out
    }

    #[test]
    fn headers_pe32_and_pe32_plus() {
        for plus in [false, true] {
            let a = PeArchive::from_bytes(image(plus, &[0; 16], None), 0).unwrap();
            assert_eq!(a.pe.optional.is_pe32_plus(), plus);
            assert_eq!(a.pe.coff.machine, Machine::I386);
            assert!(a.pe.coff.characteristics.contains(Characteristics::EXECUTABLE_IMAGE));
            assert_eq!(a.pe.sections[0].name, ".rsrc");
            assert_eq!(a.pe.data_directories.len(), 16);
            let base = if plus { 0x1_4000_0000 } else { 0x40_0000 };
            assert_eq!(a.pe.optional.image_base(), base);
        }
    }

    #[test]
    fn rva_mapping() {
        let a = PeArchive::from_bytes(image(false, &[7; 16], None), 0).unwrap();
        assert_eq!(a.pe.rva_to_offset(0x40), Some(0x40));
        assert_eq!(a.pe.rva_to_offset(0x1004), Some(0x204));
        assert_eq!(a.pe.rva_to_offset(0x5000), None);
        assert_eq!(a.section_data(0).map(|d| d.len()), Some(0x200));
        assert_eq!(a.directory_data(DIRECTORY_RESOURCE), Some(&[7u8; 16][..]));
        assert_eq!(a.directory_data(DIRECTORY_EXPORT), None);
    }

    #[test]
    fn not_a_pe() {
        assert!(matches!(
            PeArchive::from_bytes(b"ZM\0\0".to_vec(), 0),
            Err(Error::BadMagic)
        ));
    }

    #[test]
    fn version_resource_through_archive() {
        let version = version::tests::sample();
        let rsrc = resource::tests::tree_bytes(&[
            (ResourceKey::Id(resource::RT_VERSION), 1, 1033, &version[..]),
            (ResourceKey::Name("CUSTOM".into()), 5, 0, &b"hello"[..]),
        ]);
        let a = PeArchive::from_bytes(image(true, &rsrc, None), 0).unwrap();

        let info = a.version_info().unwrap();
        assert_eq!(info.get_string("companyname"), Some("Valve"));
        assert_eq!(a.resources().entries.len(), 2);
        assert_eq!(a.entry_count(), 2);
        assert_eq!(a.read_entry(0).unwrap().path, "RT_VERSION/1/1033.bin");
        assert_eq!(
            a.read_entry(1).unwrap(),
            ExtractedEntry::new("CUSTOM/5/0.bin", b"hello".to_vec())
        );

        let dir = tempfile::tempdir().unwrap();
        assert!(a.extract_resources(dir.path()));
        assert!(dir.path().join("RT_VERSION/1/1033.bin").exists());
        assert_eq!(
            std::fs::read(dir.path().join("CUSTOM/5/0.bin")).unwrap(),
            b"hello"
        );
    }

    #[test]
    fn debug_directory_through_archive() {
        let mut rsds = b"RSDS".to_vec();
        rsds.extend_from_slice(&[0xAA; 16]);
        rsds.extend_from_slice(&1u32.to_le_bytes());
        rsds.extend_from_slice(b"game.pdb\0");

        let mut blob = Vec::new();
        blob.extend_from_slice(&[0; 12]);
        blob.extend_from_slice(&debug::DEBUG_TYPE_CODEVIEW.to_le_bytes());
        blob.extend_from_slice(&(rsds.len() as u32).to_le_bytes());
        blob.extend_from_slice(&0x101Cu32.to_le_bytes());
        blob.extend_from_slice(&0x21Cu32.to_le_bytes());
        blob.extend_from_slice(&rsds);

        let a = PeArchive::from_bytes(image(false, &blob, Some((0x1000, 28))), 0).unwrap();
        let info = a.debug_info();
        assert_eq!(info.entries.len(), 1);
        assert_eq!(info.pdb().map(|cv| cv.pdb_path()), Some("game.pdb"));
        assert!(std::ptr::eq(info, a.debug_info()));
    }

    #[test]
    fn garbage_resources_give_empty_cache() {
        let a = PeArchive::from_bytes(image(false, &[0xFF; 16], None), 0).unwrap();
        assert_eq!(a.entry_count(), 0);
        assert!(a.resources().entries.is_empty());
        assert!(a.version_info().is_none());
        assert!(a.debug_info().entries.is_empty());
    }
}
