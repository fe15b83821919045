//! Line-based command front end used by the binary.

use anyhow::{bail, Context, Result};
use std::time::Duration;

use crate::{
    audio::{
        player::AudioPlayer,
        queue::{PlayableRef, QueueInfo, Track},
        session::Enqueued,
        ChannelId, SessionKey,
    },
    events::format_duration,
};

/// Tracks listed by `queue` before collapsing the rest.
const QUEUE_PREVIEW: usize = 10;

pub const HELP: &str = "\
Comandos:
  play <guild> <canal> <segundos> [@usuario] <título...>
  skip|pause|resume|clear|shuffle|queue|leave <guild>
  volume <guild> <0-100>
  loop <guild> [on|off]
  members <guild> <n>";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play {
        key: SessionKey,
        channel: ChannelId,
        track: Track,
    },
    Skip(SessionKey),
    Pause(SessionKey),
    Resume(SessionKey),
    Clear(SessionKey),
    Shuffle(SessionKey),
    Queue(SessionKey),
    Leave(SessionKey),
    Volume(SessionKey, i32),
    Loop(SessionKey, Option<bool>),
    Members(SessionKey, usize),
    Help,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace();
        let name = parts.next().context("comando vacío")?;

        let command = match name {
            "play" => {
                let key = key(parts.next())?;
                let channel = ChannelId(number(parts.next(), "canal")?);
                let secs: u64 = number(parts.next(), "segundos")?;
                let mut words = parts.peekable();
                let requester = match words.peek().and_then(|word| word.strip_prefix('@')) {
                    Some(user) => {
                        let user = user.parse::<u64>().context("usuario inválido")?;
                        words.next();
                        Some(user)
                    }
                    None => None,
                };
                let title = words.collect::<Vec<_>>().join(" ");
                if title.is_empty() {
                    bail!("falta el título");
                }
                let source = PlayableRef::new(format!("sim:{}", title));
                let mut track = Track::new(title, source);
                if secs > 0 {
                    track = track.with_duration(Duration::from_secs(secs));
                }
                if let Some(user) = requester {
                    track = track.requested_by(user);
                }
                Self::Play {
                    key,
                    channel,
                    track,
                }
            }
            "skip" => Self::Skip(key(parts.next())?),
            "pause" => Self::Pause(key(parts.next())?),
            "resume" => Self::Resume(key(parts.next())?),
            "clear" => Self::Clear(key(parts.next())?),
            "shuffle" => Self::Shuffle(key(parts.next())?),
            "queue" => Self::Queue(key(parts.next())?),
            "leave" | "disconnect" => Self::Leave(key(parts.next())?),
            "volume" => Self::Volume(key(parts.next())?, number(parts.next(), "volumen")?),
            "loop" => {
                let key = key(parts.next())?;
                let mode = match parts.next() {
                    None => None,
                    Some("on") => Some(true),
                    Some("off") => Some(false),
                    Some(other) => bail!("modo de loop desconocido: {}", other),
                };
                Self::Loop(key, mode)
            }
            "members" => Self::Members(key(parts.next())?, number(parts.next(), "miembros")?),
            "help" => Self::Help,
            other => bail!("comando desconocido: {}", other),
        };

        Ok(command)
    }
}

fn key(raw: Option<&str>) -> Result<SessionKey> {
    Ok(SessionKey(number(raw, "guild")?))
}

fn number<T: std::str::FromStr>(raw: Option<&str>, what: &str) -> Result<T> {
    raw.with_context(|| format!("falta {}", what))?
        .parse()
        .map_err(|_| anyhow::anyhow!("{} inválido", what))
}

/// Applies a command and returns the reply to print.
pub fn execute(player: &AudioPlayer, command: Command) -> Result<String> {
    let reply = match command {
        Command::Play {
            key,
            channel,
            track,
        } => match player.enqueue(key, channel, track)? {
            Enqueued::NowPlaying(track) => format!("🎵 Reproduciendo Ahora: {}", track.title),
            Enqueued::Queued { position } => {
                format!("📝 Agregado a la cola, posición {}", position + 1)
            }
        },
        Command::Skip(key) => format!("⏭️ Track **{}** saltado", player.skip(key)?.title),
        Command::Pause(key) => {
            player.pause(key)?;
            "⏸️ Reproducción pausada".to_string()
        }
        Command::Resume(key) => {
            player.resume(key)?;
            "▶️ Reproducción reanudada".to_string()
        }
        Command::Clear(key) => {
            player.clear(key)?;
            "🧹 Cola limpiada".to_string()
        }
        Command::Shuffle(key) => format!("🔀 {} tracks mezclados", player.shuffle(key)?),
        Command::Queue(key) => match player.snapshot(key) {
            Some(info) => render_queue(&info),
            None => "📝 La cola está vacía".to_string(),
        },
        Command::Leave(key) => {
            player.disconnect(key)?;
            "👋 Desconectado del canal de voz".to_string()
        }
        Command::Volume(key, volume) => {
            format!("🔊 Volumen en {}%", player.set_volume(key, volume)?)
        }
        Command::Loop(key, mode) => {
            let enabled = match mode {
                Some(enabled) => {
                    player.set_loop(key, enabled);
                    enabled
                }
                None => player.toggle_loop(key),
            };
            if enabled {
                "🔂 Repetición activada".to_string()
            } else {
                "➡️ Repetición desactivada".to_string()
            }
        }
        Command::Members(key, members) => {
            player.notify_membership_changed(key, members);
            format!("👥 {} miembros en el canal", members)
        }
        Command::Help => HELP.to_string(),
    };

    Ok(reply)
}

pub fn render_queue(info: &QueueInfo) -> String {
    if info.current.is_none() && info.items.is_empty() {
        return "📝 La cola está vacía".to_string();
    }

    let mut out = String::new();
    if let Some(current) = &info.current {
        let track = &current.track;
        out.push_str(&format!("🔊 Sonando: {}", track.title));
        if let Some(user) = track.requested_by {
            out.push_str(&format!(" (pedido por <@{}>)", user));
        }
        out.push('\n');
        if let Some(thumbnail) = &track.thumbnail {
            out.push_str(&format!("🖼️ {}\n", thumbnail));
        }
    }

    let page = info.page(1, QUEUE_PREVIEW);
    if page.items.is_empty() {
        out.push_str("Sin tracks pendientes\n");
    } else {
        out.push_str("📋 En cola:\n");
        for (offset, item) in page.items.iter().enumerate() {
            out.push_str(&format!(
                "{}. {}\n",
                page.first_position + offset + 1,
                item.track.title
            ));
        }
        if page.remaining > 0 {
            out.push_str(&format!("...y {} más\n", page.remaining));
        }
    }

    out.push_str(&format!(
        "⏱️ Total {} | 🔊 {}% | loop {}",
        format_duration(info.total_duration),
        info.volume,
        if info.loop_enabled { "on" } else { "off" }
    ));
    out
}
