// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Tests to ensure there is no stderr output for successful commands.

use tempfile::TempDir;

use crate::{calpipe, get_calapps, get_cmd_output, get_views};

#[test]
fn test_resolve_cal_no_stderr() {
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
    assert!(
        cmd.is_ok(),
        "resolve-cal failed on simple test data: {}",
        cmd.err().unwrap()
    );
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.is_empty(), "stderr wasn't empty: {stderr}");
}

#[test]
fn test_flag_view_no_stderr() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let views = get_views(tmp_dir.path());

    #[rustfmt::skip]
    let cmd = calpipe()
        .args([
            "flag-view",
            "--views", &format!("{}", views.display()),
            "--niter", "2",
        ])
        .ok();
    assert!(
        cmd.is_ok(),
        "flag-view failed on simple test data: {}",
        cmd.err().unwrap()
    );
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.is_empty(), "stderr wasn't empty: {stderr}");
}
