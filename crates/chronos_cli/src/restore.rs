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
use anyhow::{bail, Context, Error};
use bpaf::*;
use chronos_core::progress::CancelHandle;
use chronos_core::restore::RestoreJob;
use chronos_core::{descriptor, enumerate};

use crate::args::GlobalOptions;
use crate::progress_reporter::CliProgressReporter;

#[derive(Clone, Debug)]
pub(crate) struct RestoreParams {
    source: String,
    target: String,
    verify: bool,
    force: bool,
}

pub(crate) fn restore_parser() -> impl Parser<RestoreParams> {
    let source = long("source").short('s').argument::<String>("IMAGE").help("Path to the backup image (container or plain file)");
    let target = long("target").short('t').argument::<String>("TARGET").help("Disk index or disk:partition to restore onto");
    let verify = long("verify").help("Request post-restore verification (currently logs a warning: the restore engine does not read back written data; run `chronos verify` separately)").switch();
    let force = long("force").help("Allow restoring onto a disk flagged as system or boot").switch();
    construct!(RestoreParams { source, target, verify, force })
}

pub(crate) fn run(global: &GlobalOptions, params: &RestoreParams) -> Result<(), Error> {
    let target_desc = descriptor::parse_device(&params.target).context("parsing --target")?;
    let target_disk = enumerate::get_disk(target_desc.disk_index).with_context(|| format!("disk {} was not found", target_desc.disk_index))?;
    let target_partition_size = match target_desc.partition_number {
        Some(number) => {
            let partitions = enumerate::list_partitions(&target_disk);
            let partition = partitions.iter().find(|p| p.number == number);
            match partition {
                Some(p) => Some(p.size),
                None => bail!("disk {} has no partition {number}", target_disk.index),
            }
        }
        None => None,
    };

    let job = RestoreJob { source: params.source.clone(), target: params.target.clone(), verify_during_restore: params.verify, force_overwrite: params.force };
    let validated = chronos_core::restore::validate(&job, &target_disk, target_partition_size)?;

    let reporter = CliProgressReporter { quiet: global.quiet };
    let cancel = CancelHandle::new();
    let bytes_written = chronos_core::restore::execute(&job, &validated, &reporter, &cancel)?;

    println!("restore complete: {bytes_written} bytes written");
    Ok(())
}
