use assert_cmd::cargo::cargo_bin_cmd;

#[test]
fn cycle_help_documents_the_dry_run_default() {
    let mut cmd = cargo_bin_cmd!("deckhandctl");
    let output = cmd
        .arg("cycle")
        .arg("--help")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8_lossy(&output);
    assert!(text.contains("--run"), "cycle help missing --run flag");
    assert!(
        text.contains("nothing is touched"),
        "cycle help missing dry-run note"
    );
}

#[test]
fn orphans_flags_are_mutually_exclusive() {
    let mut cmd = cargo_bin_cmd!("deckhandctl");
    cmd.arg("orphans").arg("--run").arg("--adopt").assert().failure();
}

#[test]
fn top_level_help_lists_all_subcommands() {
    let mut cmd = cargo_bin_cmd!("deckhandctl");
    let output = cmd
        .arg("--help")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8_lossy(&output);
    for subcommand in ["cycle", "init", "check", "orphans"] {
        assert!(text.contains(subcommand), "help missing {subcommand}");
    }
}
