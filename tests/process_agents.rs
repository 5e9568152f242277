#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::{Duration, Instant};

use connect_four_arena::error::{AgentTimeout, EvalError};
use connect_four_arena::prelude::*;

/// Connects back on the port given as first argument and reads the request line.
const PROLOGUE: &str = "#!/bin/bash\nexec 3<>/dev/tcp/127.0.0.1/$1\nread -r line <&3\n";

fn write_agent(root: &Path, player: &str, body: &str) {
    let dir = root.join(player);
    std::fs::create_dir_all(&dir).unwrap();
    let script = dir.join("agent.sh");
    std::fs::write(&script, body).unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
}

fn evaluator(root: &Path, timeout: Duration) -> Evaluator<DirectoryRegistry> {
    let constraints = ConstraintsBuilder::new()
        .with_action_timeout(timeout)
        .build()
        .unwrap();
    let config = Configuration::new().with_allow_uncontained(true);
    Evaluator::from_directory(root, config, constraints)
}

#[test]
fn script_agents_play_a_full_match() {
    let root = tempfile::tempdir().unwrap();
    write_agent(root.path(), "player1", &format!("{PROLOGUE}echo 0 >&3\n"));
    write_agent(root.path(), "player2", &format!("{PROLOGUE}echo 1 >&3\n"));

    let outcome = evaluator(root.path(), Duration::from_secs(5))
        .simulate_match(MatchSettings::default())
        .unwrap();

    assert_eq!(outcome.winner(), Some(Mark::One));
    assert_eq!(outcome.log().len(), 7);
    outcome.replay().unwrap();
}

#[test]
fn arguments_from_the_config_file_are_passed() {
    let root = tempfile::tempdir().unwrap();
    // answers with its first extra argument, after the port and the timeout
    write_agent(root.path(), "player1", &format!("{PROLOGUE}echo $3 >&3\n"));
    std::fs::write(
        root.path().join("player1").join("agent.yaml"),
        "eval: right\nconfigs:\n  - left: \"0\"\n  - right: \"5\"\n",
    )
    .unwrap();

    let board = vec![0; 42];
    assert_eq!(
        evaluator(root.path(), Duration::from_secs(5)).get_move(1, &board, 7),
        Ok(5)
    );
}

#[test]
fn request_line_carries_the_board() {
    let root = tempfile::tempdir().unwrap();
    // plays column 2 only if it was told it is player 2
    write_agent(
        root.path(),
        "player2",
        &format!(
            "{PROLOGUE}if [[ $line == *'\"mark\":2'* ]]; then echo 2 >&3; else echo 9 >&3; fi\n"
        ),
    );

    let board = vec![0; 42];
    assert_eq!(
        evaluator(root.path(), Duration::from_secs(5)).get_move(2, &board, 7),
        Ok(2)
    );
}

#[test]
fn silent_process_times_out_and_is_killed() {
    let root = tempfile::tempdir().unwrap();
    write_agent(root.path(), "player1", &format!("{PROLOGUE}sleep 30\n"));
    write_agent(root.path(), "player2", &format!("{PROLOGUE}echo 0 >&3\n"));

    let start = Instant::now();
    let outcome = evaluator(root.path(), Duration::from_millis(500))
        .simulate_match(MatchSettings::default())
        .unwrap();
    assert!(start.elapsed() < Duration::from_secs(5));

    assert_eq!(outcome.winner(), Some(Mark::Two));
    assert_eq!(outcome.log()[0].column, Move::Error);
    assert_eq!(outcome.log()[0].reason.as_deref(), Some("Agent timed out."));
}

#[test]
fn crashing_or_babbling_processes_fault() {
    let root = tempfile::tempdir().unwrap();
    write_agent(root.path(), "player1", "#!/bin/bash\nexit 3\n");
    write_agent(root.path(), "player2", &format!("{PROLOGUE}echo banana >&3\n"));
    let evaluator = evaluator(root.path(), Duration::from_secs(5));
    let board = vec![0; 42];

    assert!(matches!(
        evaluator.get_move(1, &board, 7),
        Err(EvalError::Fault(_))
    ));
    assert!(matches!(
        evaluator.get_move(2, &board, 7),
        Err(EvalError::Fault(_))
    ));

    let outcome = evaluator.simulate_match(MatchSettings::default()).unwrap();
    assert_eq!(outcome.winner(), Some(Mark::Two));
    assert_eq!(outcome.log()[0].column, Move::Error);
}

#[test]
fn missing_upload_is_a_resolution_error() {
    let root = tempfile::tempdir().unwrap();
    write_agent(root.path(), "player1", &format!("{PROLOGUE}echo 0 >&3\n"));

    let err = evaluator(root.path(), Duration::from_secs(5))
        .simulate_match(MatchSettings::default())
        .unwrap_err();
    assert_eq!(err.player, Mark::Two);
}

#[test]
fn trickling_answer_is_cut_at_the_deadline() {
    let root = tempfile::tempdir().unwrap();
    // one byte every 100ms for 4s, newline last
    write_agent(
        root.path(),
        "player1",
        &format!("{PROLOGUE}for i in $(seq 40); do printf a >&3; sleep 0.1; done\necho >&3\n"),
    );
    let board = vec![0; 42];

    let start = Instant::now();
    let result = evaluator(root.path(), Duration::from_millis(500)).get_move(1, &board, 7);
    let elapsed = start.elapsed();

    assert_eq!(result, Err(EvalError::Timeout(AgentTimeout)));
    assert!(elapsed < Duration::from_secs(2), "answer read for {elapsed:?}");
}

#[test]
fn flooding_answer_is_a_fault() {
    let root = tempfile::tempdir().unwrap();
    write_agent(
        root.path(),
        "player1",
        &format!("{PROLOGUE}cat /dev/zero | tr '\\0' a >&3\n"),
    );
    let board = vec![0; 42];

    let start = Instant::now();
    let result = evaluator(root.path(), Duration::from_secs(2)).get_move(1, &board, 7);

    match result {
        Err(EvalError::Fault(fault)) => assert!(fault.message.contains("longer than")),
        other => panic!("expected a fault, got {other:?}"),
    }
    assert!(start.elapsed() < Duration::from_secs(2));
}

/// Running and not a zombie.
#[cfg(target_os = "linux")]
fn is_running(pid: u32) -> bool {
    let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
        return false;
    };
    let state = stat
        .rfind(')')
        .and_then(|i| stat[i + 1..].trim_start().chars().next());
    !matches!(state, None | Some('Z') | Some('X'))
}

#[cfg(target_os = "linux")]
#[test]
fn processes_started_by_an_agent_die_with_it() {
    let root = tempfile::tempdir().unwrap();
    let pid_file = root.path().join("background.pid");
    write_agent(
        root.path(),
        "player1",
        &format!(
            "#!/bin/bash\nsleep 77.7 &\necho $! > '{}'\n{}wait\n",
            pid_file.display(),
            PROLOGUE.trim_start_matches("#!/bin/bash\n")
        ),
    );
    let board = vec![0; 42];

    let result = evaluator(root.path(), Duration::from_secs(1)).get_move(1, &board, 7);
    assert_eq!(result, Err(EvalError::Timeout(AgentTimeout)));

    let background: u32 = std::fs::read_to_string(&pid_file)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    let deadline = Instant::now() + Duration::from_secs(2);
    while is_running(background) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(!is_running(background), "process {background} outlived its agent");
}
