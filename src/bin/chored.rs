//
// Copyright (c) Memfault, Inc.
// See License.txt for details
use chored::cli;

fn main() {
    cli::main()
}
