// Copyright 2025-2026 the purgatory developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
//
// See the LICENSE-APACHE or LICENSE-MIT files at the top-level directory
// of this distribution.

use assert_cmd::Command;
use predicates::prelude::*;

fn purgatory() -> Command {
    let mut cmd = Command::cargo_bin("purgatory").unwrap();
    cmd.arg("--dpkg-status-database")
        .arg(format!("{}/tests/data/minbase-status", env!("CARGO_MANIFEST_DIR")));
    cmd
}

#[test]
fn no_command_is_a_parse_error() {
    Command::cargo_bin("purgatory").unwrap().assert().code(2);
}

#[test]
fn unknown_flag_is_a_parse_error() {
    purgatory().arg("leafs").arg("--no-such-flag").assert().code(2);
}

#[test]
fn purge_requires_a_package() {
    purgatory().arg("purge").assert().code(2);
}

#[test]
fn leafs_lists_leaf_packages_and_cycles() {
    purgatory().arg("leafs").assert().success().stdout(
        "apt\n\
         base-files\n\
         coreutils\n\
         initscripts sysv-rc\n\
         tasksel\n",
    );
}

#[test]
fn leafs_without_recommends() {
    purgatory().arg("--ignore-recommends").arg("leafs").assert().success().stdout(
        "apt\n\
         base-files\n\
         ca-certificates\n\
         coreutils\n\
         initscripts sysv-rc\n\
         tasksel\n",
    );
}

#[test]
fn purge_prints_the_obsolete_inclusive_apt_command() {
    purgatory()
        .arg("purge")
        .arg("apt")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "apt purge apt ca-certificates gpgv libapt-pkg6.0 openssl\n",
        ));
}

#[test]
fn purge_without_recommends() {
    purgatory()
        .arg("--ignore-recommends")
        .arg("purge")
        .arg("apt")
        .assert()
        .success()
        .stdout(predicate::str::contains("apt purge apt gpgv libapt-pkg6.0\n"));
}

#[test]
fn purge_with_kept_packages() {
    purgatory()
        .arg("purge")
        .arg("apt")
        .arg("--keep")
        .arg("gpgv")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "apt purge apt ca-certificates libapt-pkg6.0 openssl\n",
        ));
}

#[test]
fn purging_a_kept_package_fails() {
    purgatory()
        .arg("purge")
        .arg("gpgv")
        .arg("--keep")
        .arg("gpgv")
        .assert()
        .failure()
        .stdout(predicate::str::contains("can't be marked as deleted"));
}

#[test]
fn a_missing_status_database_fails() {
    Command::cargo_bin("purgatory")
        .unwrap()
        .arg("--dpkg-status-database")
        .arg("/no/such/database")
        .arg("leafs")
        .assert()
        .failure()
        .stdout(predicate::str::contains("Error:"));
}
