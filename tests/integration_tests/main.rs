// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Integration tests.
//!
//! Some help for laying out these tests was taken from:
//! https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html

mod flag_view;
mod no_stderr;
mod resolve_cal;

use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
    process::Output,
    str::from_utf8,
};

use assert_cmd::{output::OutputError, Command};

fn calpipe() -> Command {
    Command::cargo_bin("calpipe").unwrap()
}

fn get_cmd_output(result: Result<Output, OutputError>) -> (String, String) {
    let output = match result {
        Ok(o) => o,
        Err(o) => o.as_output().unwrap().clone(),
    };
    (
        from_utf8(&output.stdout).unwrap().to_string(),
        from_utf8(&output.stderr).unwrap().to_string(),
    )
}

fn write_file(path: &Path, contents: &str) {
    let mut f = File::create(path).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
}

/// Write a calibration applications file to `dir`. The bandpass table exists
/// and applies to everything in "a.ms"; the phase table applies only to spw
/// 17 and doesn't exist unless `make_phase_table` is set.
fn get_calapps(dir: &Path, make_phase_table: bool) -> PathBuf {
    let bandpass = dir.join("a.ms.bcal.tbl");
    let phase = dir.join("a.ms.gcal.tbl");
    std::fs::create_dir(&bandpass).unwrap();
    if make_phase_table {
        std::fs::create_dir(&phase).unwrap();
    }

    let calapps = dir.join("calapps.toml");
    write_file(
        &calapps,
        &format!(
            r#"[[calapp]]
[calapp.calto]
vis = "a.ms"

[[calapp.calfrom]]
gaintable = "{}"
caltype = "bandpass"
calwt = true

[[calapp]]
[calapp.calto]
vis = "a.ms"
spw = [17]

[[calapp.calfrom]]
gaintable = "{}"
caltype = "gaincal"
interp = "nearest"
"#,
            bandpass.display(),
            phase.display()
        ),
    );
    calapps
}

/// Write a views file to `dir`. Antenna 1 has an outlying gain at the last
/// time.
fn get_views(dir: &Path) -> PathBuf {
    let views = dir.join("views.json");
    write_file(
        &views,
        r#"{
  "rules": [{"kind": "nmedian", "limit": 0.5, "minsample": 3}],
  "views": [
    {
      "filename": "a.gcal",
      "datatype": "gain amplitude",
      "spw": 17,
      "intent": "BANDPASS",
      "axes": [
        {"name": "Antenna1", "units": "id", "values": [0, 1, 2]},
        {"name": "Time", "units": "s", "values": [10, 20, 30, 40]}
      ],
      "data": [[1.0, 1.0, 1.0, 1.0], [1.0, 1.0, 1.0, 5.0], [1.0, 1.0, 1.0, 1.0]]
    }
  ]
}"#,
    );
    views
}
