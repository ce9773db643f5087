//! Texto de las respuestas del bot.

use std::time::Duration;

use crate::queue::{EnqueueOutcome, Placement, QueueSnapshot, SkipOutcome, TrackDescriptor};

/// Máximo de entradas de `/queue` para no pasar el límite de mensaje de Discord.
const QUEUE_PAGE: usize = 10;

/// `m:ss` o `h:mm:ss`.
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

pub fn describe_enqueued(outcome: &EnqueueOutcome) -> String {
    let track = &outcome.track;
    match outcome.placement {
        Placement::PlayingNow => format!(
            "🎵 Reproduciendo ahora: **{}** (`{}`)",
            track.title(),
            format_duration(track.duration())
        ),
        Placement::Queued { position } => format!(
            "➕ Agregada en la posición {}: **{}** (`{}`), empieza en `{}`",
            position,
            track.title(),
            format_duration(track.duration()),
            format_duration(outcome.wait)
        ),
    }
}

pub fn describe_skip(outcome: &SkipOutcome) -> String {
    match outcome {
        SkipOutcome::Idle => "📭 No hay nada reproduciéndose".to_string(),
        SkipOutcome::Skipped { skipped, next } => match next {
            Some(next) => format!(
                "⏭️ Saltada **{}**. Sigue **{}**",
                skipped.title(),
                next.title()
            ),
            None => format!("⏭️ Saltada **{}**. La cola quedó vacía", skipped.title()),
        },
        SkipOutcome::Removed { position, track } => {
            format!("❌ Eliminada la posición {}: **{}**", position, track.title())
        }
    }
}

pub fn describe_queue(snapshot: &QueueSnapshot) -> String {
    let Some(now) = &snapshot.now_playing else {
        return "📭 No hay nada en la cola".to_string();
    };

    let mut lines = vec![format!(
        "🎵 **Sonando:** {} (`{}` restantes){}",
        now.track.title(),
        format_duration(now.remaining),
        if now.paused { " ⏸️" } else { "" }
    )];

    if !snapshot.upcoming.is_empty() {
        lines.push(String::new());
        lines.push("📋 **A continuación:**".to_string());
        for entry in snapshot.upcoming.iter().take(QUEUE_PAGE) {
            lines.push(format!(
                "`{}.` {} (`{}`), empieza en `{}`",
                entry.position,
                entry.track.title(),
                format_duration(entry.track.duration()),
                format_duration(entry.starts_in)
            ));
        }
        if snapshot.upcoming.len() > QUEUE_PAGE {
            lines.push(format!("...y {} más", snapshot.upcoming.len() - QUEUE_PAGE));
        }
    }

    lines.push(String::new());
    lines.push(format!(
        "⏱️ Tiempo total: `{}`",
        format_duration(snapshot.total_remaining())
    ));
    lines.join("\n")
}

pub fn describe_search(query: &str, results: &[TrackDescriptor]) -> String {
    let mut lines = vec![format!("🔍 Resultados para **{}**:", query)];
    lines.extend(results.iter().enumerate().map(|(i, track)| {
        format!(
            "`{}.` {} (`{}`)\n<{}>",
            i + 1,
            track.title(),
            format_duration(track.duration()),
            track.locator()
        )
    }));
    if !results.is_empty() {
        lines.push(String::new());
        lines.push(format!(
            "▶️ Elige uno con `/play query:{} result:<número>`",
            query
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{JobToken, NowPlaying, SubmissionContext, Upcoming};
    use pretty_assertions::assert_eq;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn track(title: &str, duration: u64) -> TrackDescriptor {
        TrackDescriptor::new(title, format!("https://example.com/{title}"), secs(duration))
    }

    fn context() -> SubmissionContext {
        SubmissionContext {
            guild_id: 1,
            voice_channel_id: 2,
            text_channel_id: 3,
            requested_by: 4,
        }
    }

    #[test]
    fn durations_use_clock_format() {
        assert_eq!(format_duration(secs(0)), "0:00");
        assert_eq!(format_duration(secs(65)), "1:05");
        assert_eq!(format_duration(secs(3600)), "1:00:00");
        assert_eq!(format_duration(secs(3725)), "1:02:05");
    }

    #[test]
    fn enqueue_reply_mentions_wait() {
        let outcome = EnqueueOutcome {
            token: JobToken::new(2),
            track: track("B", 50),
            placement: Placement::Queued { position: 1 },
            wait: secs(100),
        };
        assert_eq!(
            describe_enqueued(&outcome),
            "➕ Agregada en la posición 1: **B** (`0:50`), empieza en `1:40`"
        );
    }

    #[test]
    fn idle_queue() {
        assert_eq!(describe_queue(&QueueSnapshot::default()), "📭 No hay nada en la cola");
    }

    #[test]
    fn queue_lists_current_and_upcoming() {
        let snapshot = QueueSnapshot {
            now_playing: Some(NowPlaying {
                track: track("A", 100),
                context: context(),
                elapsed: secs(60),
                remaining: secs(40),
                paused: true,
                streaming: true,
            }),
            upcoming: vec![Upcoming {
                position: 1,
                track: track("B", 50),
                context: context(),
                starts_in: secs(40),
            }],
        };

        assert_eq!(
            describe_queue(&snapshot),
            [
                "🎵 **Sonando:** A (`0:40` restantes) ⏸️",
                "",
                "📋 **A continuación:**",
                "`1.` B (`0:50`), empieza en `0:40`",
                "",
                "⏱️ Tiempo total: `1:30`",
            ]
            .join("\n")
        );
    }

    #[test]
    fn long_queues_are_truncated() {
        let snapshot = QueueSnapshot {
            now_playing: Some(NowPlaying {
                track: track("A", 10),
                context: context(),
                elapsed: secs(0),
                remaining: secs(10),
                paused: false,
                streaming: true,
            }),
            upcoming: (1..=12)
                .map(|i| Upcoming {
                    position: i,
                    track: track(&i.to_string(), 10),
                    context: context(),
                    starts_in: secs(10 * i as u64),
                })
                .collect(),
        };
        assert!(describe_queue(&snapshot).contains("...y 2 más"));
    }

    #[test]
    fn search_reply_explains_how_to_pick() {
        let reply = describe_search("rock", &[track("A", 65), track("B", 5)]);
        let lines: Vec<&str> = reply.lines().collect();
        assert_eq!(lines[0], "🔍 Resultados para **rock**:");
        assert_eq!(lines[1], "`1.` A (`1:05`)");
        assert_eq!(lines[2], "<https://example.com/A>");
        assert_eq!(
            lines.last().copied(),
            Some("▶️ Elige uno con `/play query:rock result:<número>`")
        );
        assert_eq!(describe_search("nada", &[]), "🔍 Resultados para **nada**:");
    }

    #[test]
    fn skip_replies() {
        assert_eq!(
            describe_skip(&SkipOutcome::Skipped {
                skipped: track("A", 1),
                next: None
            }),
            "⏭️ Saltada **A**. La cola quedó vacía"
        );
        assert_eq!(
            describe_skip(&SkipOutcome::Removed {
                position: 2,
                track: track("C", 1)
            }),
            "❌ Eliminada la posición 2: **C**"
        );
    }
}
