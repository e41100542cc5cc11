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
use std::path::PathBuf;

use anyhow::Error;
use bpaf::*;

use crate::args::GlobalOptions;

#[derive(Clone, Debug)]
pub(crate) struct VerifyParams {
    image: PathBuf,
    hash: bool,
}

pub(crate) fn verify_parser() -> impl Parser<VerifyParams> {
    let image = long("image").short('i').argument::<PathBuf>("IMAGE").help("Path to the image file to verify");
    let hash = long("hash").help("Also compute and print the image's SHA-256 content hash").switch();
    construct!(VerifyParams { image, hash })
}

pub(crate) fn run(global: &GlobalOptions, params: &VerifyParams) -> Result<(), Error> {
    chronos_core::verify::verify_image(&params.image)?;
    if !global.quiet {
        println!("{} is readable and matches its expected size", params.image.display());
    }
    if params.hash {
        let digest = chronos_core::verify::compute_hash(&params.image)?;
        println!("{digest}");
    }
    Ok(())
}
