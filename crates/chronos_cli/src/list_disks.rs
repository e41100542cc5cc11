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
use chronos_core::enumerate;

use crate::args::GlobalOptions;

#[derive(Clone, Debug)]
pub(crate) struct ListDisksParams {
    partitions: bool,
}

pub(crate) fn list_disks_parser() -> impl Parser<ListDisksParams> {
    let partitions = long("partitions").help("Also list each disk's partitions").switch();
    construct!(ListDisksParams { partitions })
}

pub(crate) fn run(_global: &GlobalOptions, params: &ListDisksParams) -> Result<(), Error> {
    let disks = enumerate::list_disks();
    if disks.is_empty() {
        println!("no physical disks were found");
        return Ok(());
    }
    for disk in &disks {
        println!(
            "disk {}: {} ({} bytes, {}-byte sectors){}{}",
            disk.index,
            disk.model,
            disk.size,
            disk.sector_size,
            if disk.is_system() { ", system" } else { "" },
            if disk.is_boot() { ", boot" } else { "" },
        );
        if params.partitions {
            for partition in enumerate::list_partitions(disk) {
                println!("  partition {}: offset {}, size {}, type {}", partition.number, partition.offset, partition.size, partition.partition_type);
            }
        }
    }
    Ok(())
}
