use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use salvage::formats::bfpk::BfpkArchive;
use salvage::formats::bsp::BspArchive;
use salvage::formats::cab::CabinetSet;
use salvage::formats::gcf::GcfArchive;
use salvage::formats::pak::PakArchive;
use salvage::formats::pe::PeArchive;
use salvage::formats::pff::PffArchive;
use salvage::formats::quantum::QuantumArchive;
use salvage::formats::sga::SgaArchive;
use salvage::formats::vbsp::VbspArchive;
use salvage::formats::vpk::VpkArchive;
use salvage::formats::wad::WadArchive;
use salvage::formats::xzp::XzpArchive;
use salvage::{Error, Extract, Result};

/// Pick a handle from the extension, checking the magic where two formats
/// share one.
fn open(path: &Path) -> Result<Box<dyn Extract>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let mut head = [0u8; 4];
    File::open(path)?.read_exact(&mut head)?;

    let handle: Box<dyn Extract> = match ext.as_str() {
        "bsp" if &head == b"VBSP" => Box::new(VbspArchive::open(path)?),
        "bsp" => Box::new(BspArchive::open(path)?),
        "pak" if &head == b"BFPK" => Box::new(BfpkArchive::open(path)?),
        "pak" => Box::new(PakArchive::open(path)?),
        "cab" => Box::new(CabinetSet::open(path)?),
        "gcf" => Box::new(GcfArchive::open(path)?),
        "pff" => Box::new(PffArchive::open(path)?),
        "q" => Box::new(QuantumArchive::open(path)?),
        "sga" => Box::new(SgaArchive::open(path)?),
        "vpk" => Box::new(VpkArchive::open(path)?),
        "wad" => Box::new(WadArchive::open(path)?),
        "xzp" => Box::new(XzpArchive::open(path)?),
        "exe" | "dll" | "ocx" | "cpl" | "scr" => Box::new(PeArchive::open(path)?),
        _ => return Err(Error::Unsupported("unknown archive extension")),
    };
    Ok(handle)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args_os().skip(1);
    let (Some(archive), out_dir) = (args.next().map(PathBuf::from), args.next()) else {
        eprintln!("usage: extract <archive> [out-dir]");
        std::process::exit(2);
    };
    let out_dir = out_dir.map_or_else(|| PathBuf::from("out"), PathBuf::from);

    let handle = open(&archive)?;
    println!("{} entries", handle.entry_count());
    if !handle.extract_all(&out_dir) {
        eprintln!("some entries failed, see log");
        std::process::exit(1);
    }
    Ok(())
}
