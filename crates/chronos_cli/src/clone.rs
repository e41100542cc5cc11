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
use anyhow::Error;
use bpaf::*;
use chronos_core::clone::CloneJob;
use chronos_core::progress::CancelHandle;

use crate::args::GlobalOptions;
use crate::progress_reporter::CliProgressReporter;

#[derive(Clone, Debug)]
pub(crate) struct CloneParams {
    source: String,
    destination: String,
}

pub(crate) fn clone_parser() -> impl Parser<CloneParams> {
    let source = long("source").short('s').argument::<String>("SOURCE").help("Disk index, disk:partition, or \\\\.\\PhysicalDriveN");
    let destination = long("destination").short('d').argument::<String>("DESTINATION").help("Disk index, disk:partition, or \\\\.\\PhysicalDriveN");
    construct!(CloneParams { source, destination })
}

pub(crate) fn run(global: &GlobalOptions, params: &CloneParams) -> Result<(), Error> {
    let job = CloneJob { source: params.source.clone(), destination: params.destination.clone() };
    let reporter = CliProgressReporter { quiet: global.quiet };
    let cancel = CancelHandle::new();
    let outcome = chronos_core::clone::execute(&job, &reporter, &cancel)?;
    println!("clone complete: {} bytes copied", outcome.bytes_copied);
    Ok(())
}
