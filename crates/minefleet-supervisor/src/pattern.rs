//! ログパターンからの状態導出

use minefleet_core::LifecycleState;

/// ログ1行から状態遷移を導出
///
/// - `Done` + `help` → Running
/// - `starting minecraft server` / `starting net.minecraft.server`（大文字小文字無視）→ Starting
/// - `Stopping server` / `Stopping the server` / `Saving worlds` → Stopping
///
/// Running中のサーバーをStartingへ巻き戻すことはありません。
/// Running遷移は一度だけ発火します。
pub fn detect_transition(line: &str, current: LifecycleState) -> Option<LifecycleState> {
    if line.contains("Done") && (line.contains("For help") || line.contains("help")) {
        if current == LifecycleState::Running {
            return None;
        }
        return Some(LifecycleState::Running);
    }

    let lowered = line.to_lowercase();
    if lowered.contains("starting minecraft server")
        || lowered.contains("starting net.minecraft.server")
    {
        // 稼働中のサーバーを巻き戻さない
        if current == LifecycleState::Running {
            return None;
        }
        if current == LifecycleState::Starting {
            return None;
        }
        return Some(LifecycleState::Starting);
    }

    if line.contains("Stopping server")
        || line.contains("Stopping the server")
        || line.contains("Saving worlds")
    {
        if current == LifecycleState::Stopping {
            return None;
        }
        return Some(LifecycleState::Stopping);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 仕様どおりのDone行でちょうど一度Runningになることを確認
    #[test]
    fn test_done_line_triggers_running_once() {
        let line = r#"Done (1.234s)! For help, type "help""#;
        assert_eq!(
            detect_transition(line, LifecycleState::Starting),
            Some(LifecycleState::Running)
        );
        // 既にRunningなら再発火しない
        assert_eq!(detect_transition(line, LifecycleState::Running), None);
    }

    /// Doneだけ・helpだけでは発火しないことを確認
    #[test]
    fn test_done_requires_help() {
        assert_eq!(
            detect_transition("Done (5.1s)!", LifecycleState::Starting),
            None
        );
        assert_eq!(
            detect_transition("type help for commands", LifecycleState::Starting),
            None
        );
    }

    /// 起動パターンが大文字小文字を無視することを確認
    #[test]
    fn test_starting_pattern_case_insensitive() {
        assert_eq!(
            detect_transition(
                "[Server thread/INFO]: Starting Minecraft server on *:25565",
                LifecycleState::Stopped
            ),
            Some(LifecycleState::Starting)
        );
        assert_eq!(
            detect_transition(
                "Starting net.minecraft.server.Main",
                LifecycleState::Stopped
            ),
            Some(LifecycleState::Starting)
        );
    }

    /// RunningからStartingへ巻き戻らないことを確認
    #[test]
    fn test_no_regression_from_running() {
        assert_eq!(
            detect_transition(
                "Starting Minecraft server on *:25565",
                LifecycleState::Running
            ),
            None
        );
    }

    /// 停止パターンを確認
    #[test]
    fn test_stopping_patterns() {
        for line in ["Stopping server", "Stopping the server", "Saving worlds"] {
            assert_eq!(
                detect_transition(line, LifecycleState::Running),
                Some(LifecycleState::Stopping),
                "line: {line}"
            );
        }
    }
}
