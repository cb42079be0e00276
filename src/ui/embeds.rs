use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::audio::queue::PlaybackRequest;

/// Paleta de colores del bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
}

const STANDARD_FOOTER: &str = "💦 Pickup Bot";

/// Longest queue listing shown in one embed.
const QUEUE_PAGE: usize = 10;

pub fn create_now_playing_embed(request: &PlaybackRequest) -> CreateEmbed {
    let duration = request
        .duration
        .map(format_duration)
        .unwrap_or_else(|| "🔴 En vivo".to_string());

    CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", request.display_text))
        .color(colors::MUSIC_PURPLE)
        .field("⏱️ Duración", duration, true)
        .url(format!("https://www.youtube.com/watch?v={}", request.media_id))
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn create_queue_embed(pending: &[String]) -> CreateEmbed {
    let description = if pending.is_empty() {
        "La cola está vacía".to_string()
    } else {
        let mut lines: Vec<String> = pending
            .iter()
            .take(QUEUE_PAGE)
            .enumerate()
            .map(|(i, title)| format!("`{}.` {}", i + 1, title))
            .collect();
        if pending.len() > QUEUE_PAGE {
            lines.push(format!("… y {} más", pending.len() - QUEUE_PAGE));
        }
        lines.join("\n")
    };

    CreateEmbed::default()
        .title(format!("📜 En cola ({})", pending.len()))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Lista de comandos para `<prefix> help`
pub fn create_help_embed(prefix: &str, max_duration: Duration) -> CreateEmbed {
    CreateEmbed::default()
        .title("💦 Pickup Bot - Comandos")
        .color(colors::MUSIC_PURPLE)
        .field(
            "🎵 Reproducción",
            format!(
                "• `{prefix} play <url o id>` - Entra a tu canal de voz y pone la canción en cola\n\
                • `{prefix} queue` - Muestra lo que falta por sonar"
            ),
            false,
        )
        .field(
            "📏 Límites",
            format!("Canciones de hasta {}", format_duration(max_duration)),
            false,
        )
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

fn format_duration(duration: Duration) -> String {
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

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_help_embed_uses_prefix_and_limit() {
        let embed = serde_json::to_value(create_help_embed("pub$", Duration::from_secs(600))).unwrap();
        let fields = embed["fields"].as_array().unwrap();

        let commands = fields[0]["value"].as_str().unwrap();
        assert!(commands.contains("`pub$ play <url o id>`"));
        assert!(commands.contains("`pub$ queue`"));
        assert_eq!(fields[1]["value"], "Canciones de hasta 10:00");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(213)), "3:33");
        assert_eq!(format_duration(Duration::from_secs(3 * 3600 + 5)), "3:00:05");
        assert_eq!(format_duration(Duration::ZERO), "0:00");
    }
}
