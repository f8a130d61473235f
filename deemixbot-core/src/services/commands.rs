//! Prefix commands understood by the bot.

/// Where the source code lives.
pub const REPO_URL: &str = "https://www.github.com/HirbodBehnam";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Repo,
    /// Link or keywords; may be empty, in which case usage is shown.
    Play(String),
    Stop,
    Skip,
    Queue,
    /// 1-based position in the queue as typed by the user.
    Remove(i64),
    Pop,
    Pause,
    Resume,
    NowPlaying,
    Search(String),
}

impl Command {
    /// Parses `input` with the prefix already stripped. Unknown commands yield `None`.
    pub fn parse(input: &str) -> Option<Command> {
        let input = input.trim();
        let (name, rest) = match input.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (input, ""),
        };
        let command = match name.to_ascii_lowercase().as_str() {
            "help" => Command::Help,
            "repo" => Command::Repo,
            "play" | "p" => Command::Play(rest.to_string()),
            "stop" | "leave" => Command::Stop,
            "skip" | "next" => Command::Skip,
            "queue" | "q" => Command::Queue,
            "remove" | "rm" => Command::Remove(rest.parse().ok()?),
            "pop" => Command::Pop,
            "pause" => Command::Pause,
            "resume" | "unpause" => Command::Resume,
            "now" | "np" => Command::NowPlaying,
            "search" => Command::Search(rest.to_string()),
            _ => return None,
        };
        Some(command)
    }
}

pub fn help_message(prefix: &str) -> String {
    format!(
        "Welcome to my private music bot v{version}. Here are the list of commands which you can use:\n\
         {p}help : Show this message again\n\
         {p}play <link>/<keyword> : Play a song from deezer or search and play a song from deezer; queues it if something is already playing\n\
         {p}search <keyword> : Search deezer and list the top results\n\
         {p}queue : Show the queue\n\
         {p}now : Show the playing track\n\
         {p}skip : Skip the playing track\n\
         {p}remove <n> : Remove the n-th track of the queue\n\
         {p}pop : Remove the last track of the queue\n\
         {p}pause / {p}resume : Pause or resume the playing track\n\
         {p}stop : Stop the music and leave the voice channel\n\
         {p}repo : Show the source code",
        version = env!("CARGO_PKG_VERSION"),
        p = prefix,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn play_keeps_the_rest_of_the_line() {
        assert_eq!(
            Command::parse("play  daft punk   one more time "),
            Some(Command::Play("daft punk   one more time".into()))
        );
        assert_eq!(Command::parse("play"), Some(Command::Play(String::new())));
    }

    #[test]
    fn simple_commands_and_aliases() {
        assert_eq!(Command::parse("stop"), Some(Command::Stop));
        assert_eq!(Command::parse("SKIP"), Some(Command::Skip));
        assert_eq!(Command::parse("np"), Some(Command::NowPlaying));
        assert_eq!(Command::parse("q"), Some(Command::Queue));
        assert_eq!(Command::parse("unpause"), Some(Command::Resume));
    }

    #[test]
    fn remove_needs_a_number() {
        assert_eq!(Command::parse("remove 3"), Some(Command::Remove(3)));
        assert_eq!(Command::parse("remove -1"), Some(Command::Remove(-1)));
        assert_eq!(Command::parse("remove three"), None);
        assert_eq!(Command::parse("remove"), None);
    }

    #[test]
    fn unknown_is_ignored() {
        assert_eq!(Command::parse("dance"), None);
        assert_eq!(Command::parse(""), None);
        // "playlist" is not "play"
        assert_eq!(Command::parse("playlist"), None);
    }

    #[test]
    fn help_uses_prefix() {
        let help = help_message("!");
        assert!(help.contains("!play <link>/<keyword>"));
        assert!(help.contains("!stop"));
    }
}
