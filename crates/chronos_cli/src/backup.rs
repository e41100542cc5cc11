/*
    chronos-core
    https://github.com/dbalsom/chronos-backup

    Copyright 2026 Daniel Balsom

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------
*/
use anyhow::{Context, Error};
use bpaf::*;
use chronos_core::backup::{BackupJob, BackupKind};
use chronos_core::progress::CancelHandle;
use chronos_core::descriptor;

use crate::args::GlobalOptions;
use crate::progress_reporter::CliProgressReporter;

#[derive(Clone, Debug)]
pub(crate) struct BackupParams {
    source: String,
    destination: String,
    compression: u32,
    snapshot: bool,
}

pub(crate) fn backup_parser() -> impl Parser<BackupParams> {
    let source = long("source").short('s').argument::<String>("SOURCE").help("Disk index, disk:partition, or \\\\.\\PhysicalDriveN");
    let destination = long("destination").short('d').argument::<String>("DESTINATION").help("Destination .vhdx/.vhd container or plain image path");
    let compression = long("compression")
        .help("zlib compression level (0 disables compression; only honored for plain-file destinations)")
        .argument::<u32>("LEVEL")
        .fallback(0);
    let snapshot = long("snapshot").help("Take a volume snapshot before copying, when available").switch();
    construct!(BackupParams { source, destination, compression, snapshot })
}

pub(crate) fn run(global: &GlobalOptions, params: &BackupParams) -> Result<(), Error> {
    let desc = descriptor::parse_device(&params.source).context("parsing --source")?;
    let kind = if desc.partition_number.is_some() { BackupKind::Partition } else { BackupKind::FullDisk };

    let job = BackupJob {
        source: params.source.clone(),
        destination: params.destination.clone(),
        kind,
        compression_level: params.compression,
        use_snapshot: params.snapshot,
    };

    let reporter = CliProgressReporter { quiet: global.quiet };
    let cancel = CancelHandle::new();
    let outcome = chronos_core::backup::execute(&job, &reporter, &cancel)?;

    println!("backup complete: {} bytes copied, {} bytes of zero-sectors skipped", outcome.bytes_copied, outcome.bytes_skipped_zero);
    Ok(())
}
