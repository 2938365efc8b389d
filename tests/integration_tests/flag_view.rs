// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::fs;

use indoc::indoc;
use tempfile::TempDir;

use crate::{calpipe, get_cmd_output, get_views, write_file};

#[test]
fn test_flag_view_flags_the_outlier() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let views = get_views(tmp_dir.path());
    let flagcmds = tmp_dir.path().join("flagcmds.txt");
    let flagged = tmp_dir.path().join("flagged.json");

    #[rustfmt::skip]
    let cmd = calpipe()
        .args([
            "flag-view",
            "--views", &format!("{}", views.display()),
            "--niter", "3",
            "--output-flagcmds", &format!("{}", flagcmds.display()),
            "--output-views", &format!("{}", flagged.display()),
        ])
        .ok();
    assert!(cmd.is_ok(), "flag-view failed: {}", cmd.err().unwrap());
    let (stdout, _) = get_cmd_output(cmd);
    assert!(stdout.contains("Stopped after 2 iteration(s): converged"), "{stdout}");

    assert_eq!(
        fs::read_to_string(&flagcmds).unwrap(),
        "mode='manual' antenna='1' timerange='40' spw='17' intent='BANDPASS' reason='nmedian'\n"
    );
    let out: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&flagged).unwrap()).unwrap();
    assert_eq!(out["converged"], true);
    assert_eq!(out["views"][0]["flag"][1][3], true);
}

#[test]
fn test_flag_view_iteration_limit() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let views = get_views(tmp_dir.path());

    // With a single iteration, the flags are applied but never checked.
    #[rustfmt::skip]
    let cmd = calpipe()
        .args([
            "flag-view",
            "--views", &format!("{}", views.display()),
        ])
        .ok();
    assert!(cmd.is_ok(), "flag-view failed: {}", cmd.err().unwrap());
    let (stdout, _) = get_cmd_output(cmd);
    assert!(stdout.contains("Stopped after 1 iteration(s): iteration-limit"), "{stdout}");
}

#[test]
fn test_flag_view_command_line_rules() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let views = get_views(tmp_dir.path());
    let flagcmds = tmp_dir.path().join("flagcmds.txt");

    // Every gain is below 6, so nothing gets flagged.
    #[rustfmt::skip]
    let cmd = calpipe()
        .args([
            "flag-view",
            "--views", &format!("{}", views.display()),
            "--fmax-limit", "6",
            "--output-flagcmds", &format!("{}", flagcmds.display()),
        ])
        .ok();
    assert!(cmd.is_ok(), "flag-view failed: {}", cmd.err().unwrap());
    let (stdout, _) = get_cmd_output(cmd);
    assert!(stdout.contains("Rules: max_abs"), "{stdout}");
    assert!(stdout.contains(": converged"), "{stdout}");
    assert!(fs::read_to_string(&flagcmds).unwrap().is_empty());
}

#[test]
fn test_flag_view_zero_iterations_is_an_error() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let views = get_views(tmp_dir.path());

    #[rustfmt::skip]
    let cmd = calpipe()
        .args([
            "flag-view",
            "--views", &format!("{}", views.display()),
            "--niter", "0",
        ])
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("niter"), "{stderr}");
}

#[test]
fn test_save_toml_then_rerun() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let views = get_views(tmp_dir.path());
    let saved = tmp_dir.path().join("saved.toml");

    #[rustfmt::skip]
    let cmd = calpipe()
        .args([
            "flag-view",
            "--views", &format!("{}", views.display()),
            "--niter", "2",
            "--dry-run",
            "--save-toml", &format!("{}", saved.display()),
        ])
        .ok();
    assert!(cmd.is_ok(), "flag-view failed: {}", cmd.err().unwrap());
    let saved_str = fs::read_to_string(&saved).unwrap();
    assert!(saved_str.contains("niter = 2"), "{saved_str}");

    // The saved file reproduces the run.
    let cmd = calpipe()
        .args(["flag-view", &format!("{}", saved.display())])
        .ok();
    assert!(cmd.is_ok(), "flag-view failed: {}", cmd.err().unwrap());
    let (stdout, _) = get_cmd_output(cmd);
    assert!(stdout.contains("Stopped after 2 iteration(s): converged"), "{stdout}");
}

#[test]
fn test_bad_views_file() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let views = tmp_dir.path().join("views.toml");
    write_file(
        &views,
        indoc! {r#"
            [[views]]
            filename = "a.gcal"
            datatype = "gain amplitude"
            data = [[1.0, 1.0, 1.0]]

            [[views.axes]]
            name = "Antenna1"
            values = [0]

            [[views.axes]]
            name = "Time"
            values = [10, 20]
        "#},
    );

    let cmd = calpipe()
        .args(["flag-view", "--views", &format!("{}", views.display())])
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("has shape (1, 3), but (1, 2) was expected"), "{stderr}");
}
