use crate::Channel;

/// Which candidate URLs an exporter writes for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportUrls {
    /// Only the URL that passed the last check; nothing for unchecked or
    /// invalid channels.
    ActiveOnly,
    /// The full candidate list in priority order.
    #[default]
    AllCandidates,
}

impl ExportUrls {
    pub fn select<'a>(self, channel: &'a Channel) -> Vec<&'a str> {
        match self {
            ExportUrls::ActiveOnly => channel.active_url().into_iter().collect(),
            ExportUrls::AllCandidates => channel.urls.iter().map(String::as_str).collect(),
        }
    }
}
