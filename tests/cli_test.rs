mod common;

use anyhow::Result;
use common::{HOST, TestCage};
use predicates::prelude::*;
use std::fs;
use std::os::unix::fs::PermissionsExt;

#[test]
fn test_init_command() -> Result<()> {
    let cage = TestCage::new()?;

    cage.cmd()
        .arg("init")
        .assert()
        .success()
        .stderr(predicate::str::contains("Initialized"));

    let manifest = cage.read_manifest()?;
    assert!(manifest.contains(HOST));
    assert!(manifest.contains("files that apply to all hosts"));

    cage.cmd()
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
    Ok(())
}

#[test]
fn test_add_diff_save_apply_cycle() -> Result<()> {
    let cage = TestCage::initialized()?;
    cage.write_target("etc/motd", "welcome\n")?;

    cage.cmd()
        .args(["add", "-t", "all", "etc/motd"])
        .assert()
        .success();
    assert_eq!(fs::read_to_string(cage.blob("all", "etc/motd"))?, "welcome\n");
    assert!(cage.read_manifest()?.contains("etc/motd"));

    cage.cmd().arg("diff").assert().success().stdout("");

    cage.write_target("etc/motd", "welcome back\n")?;
    cage.cmd()
        .arg("diff")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("-welcome\n+welcome back"));

    cage.cmd().arg("save").assert().success();
    assert_eq!(
        fs::read_to_string(cage.blob("all", "etc/motd"))?,
        "welcome back\n"
    );
    cage.cmd().arg("diff").assert().success();

    fs::remove_file(cage.target.join("etc/motd"))?;
    cage.cmd()
        .arg("apply")
        .assert()
        .success()
        .stderr(predicate::str::contains("applied all:etc/motd"));
    assert_eq!(cage.read_target("etc/motd")?, "welcome back\n");
    assert_eq!(cage.mode_of("etc/motd")?, 0o644);
    Ok(())
}

#[test]
fn test_add_to_new_tag_then_del() -> Result<()> {
    let cage = TestCage::initialized()?;
    cage.write_target("etc/nginx/nginx.conf", "worker_processes 1;\n")?;

    cage.cmd()
        .args(["add", "-t", "web", "etc/nginx/nginx.conf"])
        .assert()
        .success();
    assert_eq!(
        fs::read_to_string(cage.blob("web", "etc/nginx/nginx.conf"))?,
        "worker_processes 1;\n"
    );
    let manifest = cage.read_manifest()?;
    assert!(manifest.contains("web:"));
    assert!(manifest.contains("etc/nginx/nginx.conf"));

    cage.cmd()
        .args(["del", "-t", "web", "etc/nginx/nginx.conf"])
        .assert()
        .success();
    assert!(!cage.read_manifest()?.contains("etc/nginx/nginx.conf"));
    // the emptied tag stays
    assert!(cage.read_manifest()?.contains("web:"));
    Ok(())
}

#[test]
fn test_mode_only_difference() -> Result<()> {
    let cage = TestCage::initialized()?;
    let file = cage.write_target("etc/hosts", "127.0.0.1 localhost\n")?;
    cage.cmd().args(["add", "-t", "all", "etc/hosts"]).assert().success();

    fs::set_permissions(&file, fs::Permissions::from_mode(0o600))?;
    cage.cmd()
        .arg("diff")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("mode 0o644 -> 0o600"))
        .stdout(predicate::str::contains("@@").not());

    cage.cmd().arg("apply").assert().success();
    assert_eq!(cage.mode_of("etc/hosts")?, 0o644);
    Ok(())
}

#[test]
fn test_duplicate_add() -> Result<()> {
    let cage = TestCage::initialized()?;
    cage.write_target("etc/motd", "one\n")?;
    cage.cmd().args(["add", "-t", "all", "etc/motd"]).assert().success();

    cage.write_target("etc/motd", "two\n")?;
    cage.cmd()
        .args(["add", "-t", "all", "etc/motd"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already added to tag all"));
    assert_eq!(fs::read_to_string(cage.blob("all", "etc/motd"))?, "one\n");

    cage.cmd()
        .args(["add", "-t", "all", "-f", "etc/motd"])
        .assert()
        .success();
    assert_eq!(fs::read_to_string(cage.blob("all", "etc/motd"))?, "two\n");
    Ok(())
}

#[test]
fn test_absolute_path_under_target() -> Result<()> {
    let cage = TestCage::initialized()?;
    let file = cage.write_target("etc/motd", "hi\n")?;

    cage.cmd()
        .args(["add", "-t", "all"])
        .arg(&file)
        .assert()
        .success();
    assert!(cage.blob("all", "etc/motd").exists());
    Ok(())
}

#[test]
fn test_remove_leaves_target_and_blob() -> Result<()> {
    let cage = TestCage::initialized()?;
    cage.write_target("etc/motd", "hi\n")?;
    cage.cmd().args(["add", "-t", "all", "etc/motd"]).assert().success();

    cage.cmd()
        .args(["remove", "-t", "all", "etc/motd"])
        .assert()
        .success();
    assert!(!cage.read_manifest()?.contains("etc/motd"));
    assert!(cage.blob("all", "etc/motd").exists());
    assert_eq!(cage.read_target("etc/motd")?, "hi\n");
    Ok(())
}

#[test]
fn test_remove_purge() -> Result<()> {
    let cage = TestCage::initialized()?;
    cage.write_target("etc/motd", "hi\n")?;
    cage.cmd().args(["add", "-t", "all", "etc/motd"]).assert().success();

    cage.cmd()
        .args(["rm", "-t", "all", "--purge", "etc/motd"])
        .assert()
        .success();
    assert!(!cage.blob("all", "etc/motd").exists());
    assert!(cage.target.join("etc/motd").exists());
    Ok(())
}

#[test]
fn test_list() -> Result<()> {
    let cage = TestCage::initialized()?;
    cage.write_target("etc/motd", "hi\n")?;
    cage.write_target("etc/hosts", "127.0.0.1 localhost\n")?;
    cage.cmd()
        .args(["add", "-t", "all", "etc/motd", "etc/hosts"])
        .assert()
        .success();

    let hosts = cage.target.join("etc/hosts").display().to_string();
    let motd = cage.target.join("etc/motd").display().to_string();
    cage.cmd()
        .arg("list")
        .assert()
        .success()
        .stdout(format!("{hosts}\n{motd}\n"));

    fs::remove_file(cage.target.join("etc/motd"))?;
    cage.cmd()
        .args(["list", "-l", "--tabs"])
        .assert()
        .success()
        .stdout(predicate::str::contains(" \t-rw-r--r--\t"))
        .stdout(predicate::str::contains(format!("\tall\t{motd}\n")))
        .stdout(predicate::str::starts_with("!").or(predicate::str::contains("\n!")));
    Ok(())
}

#[test]
fn test_file_filter_glob() -> Result<()> {
    let cage = TestCage::initialized()?;
    cage.write_target("etc/ssh/sshd_config", "PermitRootLogin no\n")?;
    cage.write_target("etc/motd", "hi\n")?;
    cage.cmd()
        .args(["add", "-t", "all", "etc/ssh/sshd_config", "etc/motd"])
        .assert()
        .success();

    cage.write_target("etc/ssh/sshd_config", "PermitRootLogin yes\n")?;
    cage.write_target("etc/motd", "changed\n")?;

    cage.cmd()
        .args(["save", "etc/ssh/*"])
        .assert()
        .success()
        .stderr(predicate::str::contains("saved all:etc/ssh/sshd_config"));
    assert_eq!(
        fs::read_to_string(cage.blob("all", "etc/ssh/sshd_config"))?,
        "PermitRootLogin yes\n"
    );
    assert_eq!(fs::read_to_string(cage.blob("all", "etc/motd"))?, "hi\n");

    cage.cmd()
        .args(["save", "etc/nothing"])
        .assert()
        .success()
        .stderr(predicate::str::contains("does not match any entry"));
    Ok(())
}

#[test]
fn test_unknown_host() -> Result<()> {
    let cage = TestCage::initialized()?;
    cage.cmd()
        .args(["-n", "stranger", "apply"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No host entry for stranger"));
    Ok(())
}

#[test]
fn test_unknown_tag() -> Result<()> {
    let cage = TestCage::initialized()?;
    cage.cmd()
        .args(["-t", "nope", "apply"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No such tag: nope"));
    Ok(())
}

#[test]
fn test_tag_and_check() -> Result<()> {
    let cage = TestCage::initialized()?;
    cage.cmd()
        .args(["tag", "web", "-d", "web servers"])
        .assert()
        .success();
    assert!(cage.read_manifest()?.contains("web servers"));
    cage.cmd().arg("check").assert().success();

    cage.write_manifest(&format!("hosts:\n  {HOST}:\n    tags: [all, web]\ntags:\n  all: {{}}\n"))?;
    cage.cmd()
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("references unknown tag web"));
    Ok(())
}

#[test]
fn test_apply_hooks_run_in_order() -> Result<()> {
    let cage = TestCage::new()?;
    cage.write_manifest(&format!(
        "\
hosts:
  {HOST}:
    tags: [all]
tags:
  all:
    entries:
      etc/motd:
        type: file
        mode: '0o644'
    hooks:
      pre-apply:
        type: shell
        command: echo \"pre $1 $2 $3 $HAMSTERCAGE_TAG\" >> hooks.log
      post-apply:
        type: shell
        command: echo \"post $HAMSTERCAGE_CMD $HAMSTERCAGE_STEP\" >> hooks.log
"
    ))?;
    fs::create_dir_all(cage.repo.join("tags/all/etc"))?;
    fs::write(cage.blob("all", "etc/motd"), "hi\n")?;

    cage.cmd().arg("apply").assert().success();
    assert_eq!(
        fs::read_to_string(cage.repo.join("hooks.log"))?,
        "pre apply pre all all\npost apply post\n"
    );
    assert_eq!(cage.read_target("etc/motd")?, "hi\n");
    Ok(())
}

#[test]
fn test_failing_hook_sets_exit_status() -> Result<()> {
    let cage = TestCage::new()?;
    let manifest = format!(
        "\
hosts:
  {HOST}:
    tags: [all]
tags:
  all:
    entries:
      etc/motd:
        type: file
        mode: '0o644'
    hooks:
      pre-apply:
        type: shell
        command: exit 3
"
    );
    cage.write_manifest(&manifest)?;
    fs::create_dir_all(cage.repo.join("tags/all/etc"))?;
    fs::write(cage.blob("all", "etc/motd"), "hi\n")?;

    cage.cmd()
        .arg("apply")
        .assert()
        .failure()
        .stderr(predicate::str::contains("hook pre-apply of tag all failed"));
    assert_eq!(cage.read_target("etc/motd")?, "hi\n");

    fs::remove_file(cage.target.join("etc/motd"))?;
    cage.cmd()
        .args(["--strict-hooks", "apply"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("skipped, hook pre-apply failed"));
    assert!(!cage.target.join("etc/motd").exists());
    Ok(())
}

#[test]
fn test_partial_failure_keeps_going() -> Result<()> {
    let cage = TestCage::new()?;
    cage.write_manifest(&format!(
        "\
hosts:
  {HOST}:
    tags: [all]
tags:
  all:
    entries:
      a:
        type: file
        mode: '0o644'
      b:
        type: file
        mode: '0o644'
"
    ))?;
    fs::create_dir_all(cage.repo.join("tags/all"))?;
    fs::write(cage.blob("all", "b"), "bee\n")?;

    cage.cmd()
        .arg("apply")
        .assert()
        .failure()
        .stderr(predicate::str::contains("all:a:"))
        .stderr(predicate::str::contains("1 updated, 0 unchanged, 1 failed"));
    assert_eq!(cage.read_target("b")?, "bee\n");
    assert!(cage.path().join("target").exists());
    Ok(())
}

#[test]
fn test_completion() -> Result<()> {
    let cage = TestCage::new()?;
    cage.cmd()
        .args(["completion", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hamstercage"));
    Ok(())
}
