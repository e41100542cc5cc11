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
use std::fmt::{Display, Formatter};

use bpaf::*;

use crate::backup::{backup_parser, BackupParams};
use crate::clone::{clone_parser, CloneParams};
use crate::list_disks::{list_disks_parser, ListDisksParams};
use crate::restore::{restore_parser, RestoreParams};
use crate::verify::{verify_parser, VerifyParams};

#[derive(Clone, Debug)]
pub(crate) enum Command {
    Version,
    Backup(BackupParams),
    Restore(RestoreParams),
    Clone(CloneParams),
    Verify(VerifyParams),
    ListDisks(ListDisksParams),
}

impl Display for Command {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Version => write!(f, "version"),
            Command::Backup(_) => write!(f, "backup"),
            Command::Restore(_) => write!(f, "restore"),
            Command::Clone(_) => write!(f, "clone"),
            Command::Verify(_) => write!(f, "verify"),
            Command::ListDisks(_) => write!(f, "list-disks"),
        }
    }
}

#[derive(Debug)]
pub(crate) struct AppParams {
    pub global: GlobalOptions,
    pub command: Command,
}

#[derive(Debug)]
pub struct GlobalOptions {
    pub quiet: bool,
}

pub fn global_options_parser() -> impl Parser<GlobalOptions> {
    let quiet = long("quiet").help("Suppress progress output, printing only the final result").switch();
    construct!(GlobalOptions { quiet })
}

pub(crate) fn command_parser() -> impl Parser<AppParams> {
    let global = global_options_parser();

    let version = pure(Command::Version).to_options().command("version").help("Display version information and exit");
    let backup = construct!(Command::Backup(backup_parser())).to_options().command("backup").help("Back up a disk or partition to an image");
    let restore = construct!(Command::Restore(restore_parser())).to_options().command("restore").help("Restore an image onto a disk or partition");
    let clone = construct!(Command::Clone(clone_parser())).to_options().command("clone").help("Copy one disk or partition directly onto another");
    let verify = construct!(Command::Verify(verify_parser())).to_options().command("verify").help("Check an image file for readability and integrity");
    let list_disks = construct!(Command::ListDisks(list_disks_parser())).to_options().command("list-disks").help("List the physical disks visible to the host");

    let command = construct!([version, backup, restore, clone, verify, list_disks]);
    construct!(AppParams { global, command })
}
