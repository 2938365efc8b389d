// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use tempfile::TempDir;

use crate::{calpipe, get_calapps, get_cmd_output, write_file};

/// The part of the output after the library summary.
fn query_output(stdout: &str) -> &str {
    let start = stdout
        .find("Applicable calibrations")
        .expect("no applicable calibrations were reported");
    &stdout[start..]
}

#[test]
fn test_resolve_both_tables() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let calapps = get_calapps(tmp_dir.path(), true);

    #[rustfmt::skip]
    let cmd = calpipe()
        .args([
            "resolve-cal",
            "--calapps", &format!("{}", calapps.display()),
            "--vis", "a.ms",
            "--spw", "17",
            "--field", "0",
            "--antenna", "3",
            "--intent", "TARGET",
        ])
        .ok();
    assert!(cmd.is_ok(), "resolve-cal failed: {}", cmd.err().unwrap());
    let (stdout, _) = get_cmd_output(cmd);
    let stdout = query_output(&stdout);

    let bandpass = stdout
        .find("a.ms.bcal.tbl', caltype='bandpass', spwmap=[], interp='linear', calwt=true")
        .expect("bandpass table wasn't applicable");
    let phase = stdout
        .find("a.ms.gcal.tbl', caltype='gaincal', spwmap=[], interp='nearest', calwt=false")
        .expect("phase table wasn't applicable");
    // Tables are applied in activation order.
    assert!(bandpass < phase);
}

#[test]
fn test_resolve_other_spw() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let calapps = get_calapps(tmp_dir.path(), true);
    let output = tmp_dir.path().join("applicable.json");

    #[rustfmt::skip]
    let cmd = calpipe()
        .args([
            "resolve-cal",
            "--calapps", &format!("{}", calapps.display()),
            "--vis", "a.ms",
            "--spw", "19",
            "--field", "0",
            "--antenna", "3",
            "--intent", "TARGET",
            "--output", &format!("{}", output.display()),
        ])
        .ok();
    assert!(cmd.is_ok(), "resolve-cal failed: {}", cmd.err().unwrap());

    let applicable: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    let applicable = applicable.as_array().unwrap();
    assert_eq!(applicable.len(), 1);
    assert_eq!(applicable[0]["caltype"], "bandpass");
    assert_eq!(applicable[0]["interp"], "linear");
}

#[test]
fn test_resolve_unknown_vis() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let calapps = get_calapps(tmp_dir.path(), true);

    #[rustfmt::skip]
    let cmd = calpipe()
        .args([
            "resolve-cal",
            "--calapps", &format!("{}", calapps.display()),
            "--vis", "b.ms",
            "--spw", "17",
            "--field", "0",
            "--antenna", "3",
            "--intent", "TARGET",
        ])
        .ok();
    assert!(cmd.is_ok(), "resolve-cal failed: {}", cmd.err().unwrap());
    let (stdout, _) = get_cmd_output(cmd);
    let stdout = query_output(&stdout);
    assert!(!stdout.contains("caltype="), "{stdout}");
    assert!(stdout.contains("None"), "{stdout}");
}

#[test]
fn test_missing_table_is_an_error() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let calapps = get_calapps(tmp_dir.path(), false);
    let calapps = format!("{}", calapps.display());

    let cmd = calpipe()
        .args(["resolve-cal", "--calapps", &calapps])
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("a.ms.gcal.tbl' does not exist"), "{stderr}");

    // Unless we say it's OK.
    let cmd = calpipe()
        .args(["resolve-cal", "--calapps", &calapps, "--ignore-missing-tables"])
        .ok();
    assert!(cmd.is_ok(), "resolve-cal failed: {}", cmd.err().unwrap());

    // Dry runs don't look for tables either.
    let cmd = calpipe()
        .args(["resolve-cal", "--calapps", &calapps, "--dry-run"])
        .ok();
    assert!(cmd.is_ok(), "resolve-cal failed: {}", cmd.err().unwrap());
}

#[test]
fn test_incomplete_query_is_an_error() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let calapps = get_calapps(tmp_dir.path(), true);

    #[rustfmt::skip]
    let cmd = calpipe()
        .args([
            "resolve-cal",
            "--calapps", &format!("{}", calapps.display()),
            "--vis", "a.ms",
            "--field", "0",
        ])
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("'spw'"), "{stderr}");
}

#[test]
fn test_bad_policy_is_an_error() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let calapps = get_calapps(tmp_dir.path(), true);

    #[rustfmt::skip]
    let cmd = calpipe()
        .args([
            "resolve-cal",
            "--calapps", &format!("{}", calapps.display()),
            "--policy", "first-wins",
        ])
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("most-specific-wins"), "{stderr}");
}

#[test]
fn test_most_specific_wins_from_arg_file() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let calapps = get_calapps(tmp_dir.path(), true);
    let arg_file = tmp_dir.path().join("args.toml");
    write_file(
        &arg_file,
        &format!(
            "calapps = [\"{}\"]\npolicy = \"most-specific-wins\"\nvis = \"a.ms\"\nspw = 17\nfield = 0\nantenna = 3\nintent = \"TARGET\"\n",
            calapps.display()
        ),
    );

    let cmd = calpipe()
        .args(["resolve-cal", &format!("{}", arg_file.display())])
        .ok();
    assert!(cmd.is_ok(), "resolve-cal failed: {}", cmd.err().unwrap());
    let (stdout, _) = get_cmd_output(cmd);
    let stdout = query_output(&stdout);
    // The spw-specific application hides the broader one.
    assert!(stdout.contains("caltype='gaincal'"), "{stdout}");
    assert!(!stdout.contains("caltype='bandpass'"), "{stdout}");
}
