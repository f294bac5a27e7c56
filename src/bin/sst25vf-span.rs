#[macro_use]
extern crate clap;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

extern crate sst25vf_span;
use sst25vf_span::*;

use std::fs;
use std::io::{
	self,
	Write,
};
use std::path::PathBuf;
use std::process::exit;
use std::time::Duration;

use sst25vf_span::sim::{
	Mapped,
	SimBus,
	SimChip,
};
use sst25vf_span::span::{
	FlashSpan,
	SpanConfig,
};
use sst25vf_span::sst25vf::{
	BusyTimeout,
	KNOWN_MODELS,
	Model,
};

type Volume = FlashSpan<SimBus<Mapped>>;

fn parse_number(s: &str) -> Result<u32, std::num::ParseIntError> {
	if s.starts_with("0x") || s.starts_with("0X") {
		u32::from_str_radix(&s[2..], 16)
	} else {
		s.parse()
	}
}

fn get_number(matches: &clap::ArgMatches, name: &str) -> AResult<u32> {
	let param = match matches.value_of(name) {
		Some(p) => p,
		None => bail!("missing parameter {}", name),
	};
	parse_number(param).map_err(|e| {
		let e = failure::Error::from(e);
		let msg = format!("invalid parameter {}: {}", name, e);
		e.context(msg).into()
	})
}

/// `MODEL:PATH`
fn parse_device(param: &str) -> AResult<(&'static Model, PathBuf)> {
	let colon = match param.find(':') {
		Some(c) => c,
		None => bail!("invalid device {:?}, expected MODEL:PATH", param),
	};
	let name = &param[..colon];
	let model = match sst25vf::model_by_name(name) {
		Some(m) => m,
		None => {
			let known: Vec<&str> = KNOWN_MODELS.iter().map(|m| m.name).collect();
			bail!("unknown model {:?} (known: {})", name, known.join(", "));
		},
	};
	Ok((model, PathBuf::from(&param[colon + 1..])))
}

fn open_volume(matches: &clap::ArgMatches) -> AResult<Volume> {
	let block_size = match matches.value_of("block_size") {
		Some(_) => get_number(matches, "block_size")?,
		None => 0x1000,
	};
	let busy_timeout = match matches.value_of("timeout_ms") {
		None => BusyTimeout::default(),
		Some(_) => match get_number(matches, "timeout_ms")? {
			0 => BusyTimeout::Unbounded,
			ms => BusyTimeout::After(Duration::from_millis(ms as u64)),
		},
	};

	let mut bus = SimBus::new();
	// nothing reads the trace
	bus.set_tracing(false);
	for param in matches.values_of("device").into_iter().flatten() {
		let (model, path) = parse_device(param)?;
		let image = sim::open_image(&path, model.capacity as usize)?;
		debug!("device {}: {} in {}", bus.chips().len(), model.name, path.display());
		bus.add_chip(SimChip::with_storage(model.id, image));
	}

	let config = SpanConfig::new(block_size, bus.chips().len()).with_busy_timeout(busy_timeout);
	let mut volume = FlashSpan::new(bus, config);
	volume.init()?;
	Ok(volume)
}

fn sync_images(volume: &Volume) -> AResult<()> {
	for (device, chip) in volume.bus().chips().iter().enumerate() {
		if let Err(e) = chip.memory().sync() {
			let e = failure::Error::from(e);
			let msg = format!("couldn't sync image of device {}: {}", device, e);
			return Err(e.context(msg).into());
		}
	}
	Ok(())
}

fn hex_dump(out: &mut dyn Write, address: u32, data: &[u8]) -> io::Result<()> {
	for (i, b) in data.iter().enumerate() {
		if 0 == i % 16 {
			write!(out, "{:08x} ", address as usize + i)?;
		} else if 0 == i % 8 {
			write!(out, " ")?;
		}
		write!(out, " {:02x}", b)?;
		if 15 == i % 16 {
			writeln!(out)?;
		}
	}
	if 0 != data.len() % 16 {
		writeln!(out)?;
	}
	Ok(())
}

fn info(volume: &Volume) -> AResult<()> {
	let descriptor = match volume.descriptor() {
		Some(d) => d,
		None => bail!("volume not initialized"),
	};
	for (device, (id, blocks)) in descriptor.device_ids().iter().zip(descriptor.device_blocks()).enumerate() {
		println!("device {}: {:?}, {} blocks", device, id, blocks);
	}
	println!("block size: 0x{:x}", volume.block_size());
	println!("blocks: {}", descriptor.block_count());
	println!("capacity: 0x{:x} bytes", volume.capacity()?);
	Ok(())
}

fn read(volume: &mut Volume, sub_m: &clap::ArgMatches) -> AResult<()> {
	let address = get_number(sub_m, "ADDRESS")?;
	let length = get_number(sub_m, "LENGTH")?;
	let mut data = vec![0u8; length as usize];
	volume.read(address, &mut data)?;

	let stdout = io::stdout();
	let mut out = stdout.lock();
	if sub_m.is_present("raw") {
		out.write_all(&data)?;
	} else {
		hex_dump(&mut out, address, &data)?;
	}
	Ok(())
}

fn write(volume: &mut Volume, sub_m: &clap::ArgMatches) -> AResult<()> {
	let address = get_number(sub_m, "ADDRESS")?;
	let file = match sub_m.value_of("FILE") {
		Some(f) => f,
		None => bail!("missing parameter FILE"),
	};
	let data = match fs::read(file) {
		Ok(d) => d,
		Err(e) => {
			let e = failure::Error::from(e);
			let msg = format!("couldn't read {}: {}", file, e);
			return Err(e.context(msg).into());
		},
	};
	volume.write(address, &data)?;
	info!("wrote 0x{:x} bytes at 0x{:08x}", data.len(), address);
	Ok(())
}

fn erase_block(volume: &mut Volume, sub_m: &clap::ArgMatches) -> AResult<()> {
	let block = get_number(sub_m, "BLOCK")?;
	volume.erase_block(block)?;
	info!("erased block {}", block);
	Ok(())
}

fn resolve(volume: &Volume, sub_m: &clap::ArgMatches) -> AResult<()> {
	let address = get_number(sub_m, "ADDRESS")?;
	let location = volume.resolve_address(address)?;
	let block = address / volume.block_size();
	let (_, local_block) = volume.resolve_block(block)?;
	println!(
		"0x{:08x}: device {} offset 0x{:x} (block {}, block {} on device)",
		address, location.device, location.offset, block, local_block,
	);
	Ok(())
}

fn main_app() -> AResult<()> {
	let matches = clap_app!(@app (app_from_crate!())
		(@setting SubcommandRequiredElseHelp)
		(global_setting: clap::AppSettings::VersionlessSubcommands)
		(@arg device: -d --device +takes_value +multiple +required number_of_values(1) "flash chip as MODEL:PATH (image file, created erased if missing); repeat for each chip enable line")
		(@arg block_size: -b --block_size +takes_value "erase block size (0x1000, 0x8000 or 0x10000; default 0x1000)")
		(@arg timeout_ms: -t --timeout_ms +takes_value "busy timeout in milliseconds (0: wait forever; default 1000)")
		(@subcommand info =>
			(about: "show identified devices and volume layout")
		)
		(@subcommand read =>
			(about: "read from volume (hex dump to stdout)")
			(@arg raw: -r --raw "write raw bytes instead of hex dump")
			(@arg ADDRESS: +required "volume address")
			(@arg LENGTH: +required "number of bytes")
		)
		(@subcommand write =>
			(about: "write file content to (erased) volume")
			(@arg ADDRESS: +required "volume address")
			(@arg FILE: +required "file to write")
		)
		(@subcommand erase_block =>
			(about: "erase one block")
			(@arg BLOCK: +required "volume block number")
		)
		(@subcommand erase_all =>
			(about: "erase all devices")
		)
		(@subcommand resolve =>
			(about: "show device and offset for a volume address")
			(@arg ADDRESS: +required "volume address")
		)
	).get_matches();

	let mut volume = open_volume(&matches)?;

	let result = match matches.subcommand() {
		("info", _) => {
			info(&volume)
		},
		("read", Some(sub_m)) => {
			read(&mut volume, sub_m)
		},
		("write", Some(sub_m)) => {
			write(&mut volume, sub_m)
		},
		("erase_block", Some(sub_m)) => {
			erase_block(&mut volume, sub_m)
		},
		("erase_all", _) => {
			volume.erase_all().map_err(failure::Error::from)
		},
		("resolve", Some(sub_m)) => {
			resolve(&volume, sub_m)
		},
		("", _) => bail!("no subcommand"),
		(cmd, _) => bail!("not implemented subcommand {:?}", cmd),
	};

	// partial writes should still hit the disk
	sync_images(&volume)?;
	result
}

fn main() {
	env_logger::from_env(env_logger::Env::default().default_filter_or("info")).init();

	if let Err(e) = main_app() {
		error!("Error: {}", e);
		exit(1);
	}
}
