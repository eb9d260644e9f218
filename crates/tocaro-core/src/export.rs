//! Group selection and JSON export.
//!
//! Files are written as `<dir>/groups.json` and `<dir>/<group code>.json`,
//! indented with four spaces and with non-ASCII text left unescaped.

use std::fs;
use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::ser::PrettyFormatter;

use crate::tocaro::{Group, GroupType, PaginationOptions, TocaroClient};
use crate::CoreError;

/// File name of the groups listing.
pub const GROUPS_FILE: &str = "groups.json";

/// Exporter settings.
#[derive(Debug, Clone, Default)]
pub struct ExporterOptions {
    /// Groups listing to select from.
    pub group_type: GroupType,
    /// Pagination delay and bound.
    pub pagination: PaginationOptions,
    /// Skip groups whose name contains this text; empty disables.
    pub excludes: String,
    /// Also write `groups.json` when exporting messages.
    pub with_groups: bool,
    /// Abort on the first failing group instead of skipping it.
    pub fail_fast: bool,
}

/// Which groups' messages to export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageSelection {
    /// A single group by code; no listing or filtering.
    Group(String),
    /// Groups whose name contains the text.
    Includes(String),
    /// Every exportable group.
    All,
}

/// A group whose export failed and was skipped.
#[derive(Debug, Clone)]
pub struct GroupFailure {
    /// Group code.
    pub group_id: String,
    /// Rendered error.
    pub error: String,
}

/// Outcome of a message export.
#[derive(Debug, Clone, Default)]
pub struct ExportSummary {
    /// Files written, in order.
    pub written: Vec<PathBuf>,
    /// Total messages written.
    pub messages: usize,
    /// Groups skipped because of an error (only without fail-fast).
    pub failed: Vec<GroupFailure>,
}

/// Drives a signed-in [`TocaroClient`] and writes the results to disk.
#[derive(Debug)]
pub struct Exporter {
    client: TocaroClient,
    options: ExporterOptions,
}

impl Exporter {
    /// Create an exporter around a client.
    #[must_use]
    pub const fn new(client: TocaroClient, options: ExporterOptions) -> Self {
        Self { client, options }
    }

    /// Sign the underlying client in.
    ///
    /// # Errors
    ///
    /// Propagates every sign-in failure unchanged.
    pub async fn sign_in(&mut self, email: &str, password: &str) -> Result<(), CoreError> {
        self.client.sign_in(email, password).await
    }

    /// The wrapped client.
    #[must_use]
    pub const fn client(&self) -> &TocaroClient {
        &self.client
    }

    /// Exporter settings.
    #[must_use]
    pub const fn options(&self) -> &ExporterOptions {
        &self.options
    }

    /// Fetch the configured groups listing.
    ///
    /// # Errors
    ///
    /// Propagates client errors.
    pub async fn get_groups(&self) -> Result<Vec<Group>, CoreError> {
        self.client.get_groups(self.options.group_type).await
    }

    /// Fetch the groups listing and write it to `<dir>/groups.json`.
    ///
    /// # Errors
    ///
    /// Propagates client errors and write failures.
    pub async fn export_groups(&self, dir: &Path) -> Result<Vec<Group>, CoreError> {
        let groups = self.get_groups().await?;
        let path = dir.join(GROUPS_FILE);
        log::info!("saving {} groups to {}", groups.len(), path.display());
        save_json(&groups, &path)?;
        Ok(groups)
    }

    /// Codes of the groups worth exporting.
    ///
    /// Only `group` and `talk` entries are kept. A non-empty `excludes`
    /// drops names containing it; a non-empty `includes` keeps only names
    /// containing it.
    #[must_use]
    pub fn gather_group_ids(groups: &[Group], includes: &str, excludes: &str) -> Vec<String> {
        groups
            .iter()
            .filter(|group| {
                let kind = group.kind();
                if !kind.is_exportable() {
                    log::debug!(
                        "group_id: {}, type {kind} is not group or talk, skipping",
                        group.code()
                    );
                    return false;
                }
                if !excludes.is_empty() && group.name().contains(excludes) {
                    log::debug!(
                        "group_id: {}, name contains excluded text, skipping",
                        group.code()
                    );
                    return false;
                }
                if !includes.is_empty() && !group.name().contains(includes) {
                    log::debug!(
                        "group_id: {}, name does not contain included text, skipping",
                        group.code()
                    );
                    return false;
                }
                true
            })
            .map(|group| group.code().to_string())
            .collect()
    }

    /// Export the message history of the selected groups, one file each.
    ///
    /// # Errors
    ///
    /// Returns the first error when fail-fast is on; otherwise only errors
    /// raised while listing groups are returned and per-group failures are
    /// collected in the summary.
    pub async fn export_messages(
        &self,
        dir: &Path,
        selection: &MessageSelection,
    ) -> Result<ExportSummary, CoreError> {
        let mut summary = ExportSummary::default();

        let group_ids = match selection {
            MessageSelection::Group(id) => {
                if self.options.with_groups {
                    self.export_groups(dir).await?;
                    summary.written.push(dir.join(GROUPS_FILE));
                }
                vec![id.clone()]
            }
            MessageSelection::Includes(_) | MessageSelection::All => {
                let groups = if self.options.with_groups {
                    let groups = self.export_groups(dir).await?;
                    summary.written.push(dir.join(GROUPS_FILE));
                    groups
                } else {
                    self.get_groups().await?
                };
                let includes = match selection {
                    MessageSelection::Includes(text) => text.as_str(),
                    _ => "",
                };
                Self::gather_group_ids(&groups, includes, &self.options.excludes)
            }
        };
        log::info!("gathered group ids: {group_ids:?}");

        for group_id in &group_ids {
            match self.export_group(dir, group_id).await {
                Ok((path, count)) => {
                    summary.written.push(path);
                    summary.messages += count;
                }
                Err(e) if !self.options.fail_fast => {
                    log::error!("group {group_id}: export failed, continuing: {e}");
                    summary.failed.push(GroupFailure {
                        group_id: group_id.clone(),
                        error: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        Ok(summary)
    }

    async fn export_group(
        &self,
        dir: &Path,
        group_id: &str,
    ) -> Result<(PathBuf, usize), CoreError> {
        let path = group_file(dir, group_id)?;
        let messages = self
            .client
            .get_all_messages(group_id, self.options.pagination)
            .await?;
        log::info!("saving {} messages to {}", messages.len(), path.display());
        save_json(&messages, &path)?;
        Ok((path, messages.len()))
    }
}

/// Output file for a group, refusing codes that would escape `dir`.
fn group_file(dir: &Path, group_id: &str) -> Result<PathBuf, CoreError> {
    if group_id.is_empty()
        || group_id == "."
        || group_id == ".."
        || group_id.contains(['/', '\\'])
    {
        return Err(CoreError::Path(format!(
            "group id {group_id:?} is not usable as a file name"
        )));
    }
    Ok(dir.join(format!("{group_id}.json")))
}

/// Write `value` as JSON indented with four spaces, creating parent dirs.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be written.
pub fn save_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let file = fs::File::create(path)?;
    let mut writer = BufWriter::new(file);
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut writer, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut serializer)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tocaro::{Message, SessionConfig};
    use httpmock::prelude::*;
    use serde_json::json;
    use std::time::Duration;

    fn group(code: &str, name: &str, kind: &str) -> Group {
        serde_json::from_value(json!({ "code": code, "name": name, "type": kind })).unwrap()
    }

    #[test]
    fn gather_filters_by_kind_and_name() {
        let groups = vec![
            group("g1", "開発チーム", "group"),
            group("t1", "山田さん", "talk"),
            group("b1", "お知らせ", "board"),
            group("g2", "archive 2019", "group"),
            group("g3", "開発 archive", "group"),
        ];

        assert_eq!(
            Exporter::gather_group_ids(&groups, "", ""),
            ["g1", "t1", "g2", "g3"]
        );
        assert_eq!(
            Exporter::gather_group_ids(&groups, "", "archive"),
            ["g1", "t1"]
        );
        assert_eq!(
            Exporter::gather_group_ids(&groups, "開発", "archive"),
            ["g1"]
        );
    }

    #[test]
    fn save_json_indents_and_keeps_unicode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("g1.json");
        let mut message = Message::new("01A");
        message.fields_mut().insert("text".to_string(), json!("こんにちは"));

        save_json(&[message], &path).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            "[\n    {\n        \"ulid\": \"01A\",\n        \"text\": \"こんにちは\"\n    }\n]"
        );
    }

    #[test]
    fn group_file_rejects_path_like_ids() {
        let dir = Path::new("/tmp/out");
        assert_eq!(group_file(dir, "abc").unwrap(), dir.join("abc.json"));
        assert!(group_file(dir, "../etc/passwd").is_err());
        assert!(group_file(dir, "..").is_err());
        assert!(group_file(dir, "").is_err());
    }

    async fn signed_in_exporter(server: &MockServer, options: ExporterOptions) -> Exporter {
        server.mock(|when, then| {
            when.method(GET).path("/sign-in");
            then.status(200).body(
                r#"<form class="submitOnce"><input name="authenticity_token" value="c"></form>"#,
            );
        });
        server.mock(|when, then| {
            when.method(POST).path("/sign-in");
            then.status(200).body(
                "var bootData = {\"currentUser\":{\"credentials\":{\"tocaro\":{\"token\":\"tk\"}}}}\n",
            );
        });
        server.mock(|when, then| {
            when.method(GET).path("/api/v3/groups").query_param("type", "show");
            then.status(200).json_body(json!([
                {"code": "g1", "name": "general", "type": "group"},
                {"code": "t1", "name": "alice", "type": "talk"},
                {"code": "b1", "name": "board", "type": "board"},
                {"code": "g2", "name": "old archive", "type": "group"}
            ]));
        });

        let client = TocaroClient::new(SessionConfig {
            base_url: server.base_url(),
            ..SessionConfig::default()
        })
        .unwrap();
        let mut exporter = Exporter::new(client, options);
        exporter.sign_in("user@example.com", "pw").await.unwrap();
        exporter
    }

    fn mock_single_page<'a>(
        server: &'a MockServer,
        group_id: &str,
        ulid: &str,
    ) -> httpmock::Mock<'a> {
        let path = format!("/api/v3/groups/{group_id}/messages");
        server.mock(|when, then| {
            when.method(GET).path(path.as_str()).query_param_missing("ulid");
            then.status(200).json_body(json!([{ "ulid": ulid }]));
        });
        server.mock(|when, then| {
            when.method(GET).path(path.as_str()).query_param("ulid", ulid);
            then.status(200).json_body(json!([]));
        })
    }

    fn options() -> ExporterOptions {
        ExporterOptions {
            pagination: PaginationOptions {
                delay: Duration::ZERO,
                max_pages: None,
            },
            excludes: "archive".to_string(),
            fail_fast: true,
            ..ExporterOptions::default()
        }
    }

    #[tokio::test]
    async fn export_all_writes_one_file_per_selected_group() {
        let server = MockServer::start_async().await;
        let opts = ExporterOptions {
            with_groups: true,
            ..options()
        };
        let exporter = signed_in_exporter(&server, opts).await;
        mock_single_page(&server, "g1", "m1");
        mock_single_page(&server, "t1", "m2");
        let archived = mock_single_page(&server, "g2", "m3");
        let dir = tempfile::tempdir().unwrap();

        let summary = exporter
            .export_messages(dir.path(), &MessageSelection::All)
            .await
            .unwrap();

        assert_eq!(summary.messages, 2);
        assert_eq!(
            summary.written,
            [
                dir.path().join("groups.json"),
                dir.path().join("g1.json"),
                dir.path().join("t1.json"),
            ]
        );
        let groups: Vec<Group> =
            serde_json::from_str(&fs::read_to_string(dir.path().join("groups.json")).unwrap())
                .unwrap();
        assert_eq!(groups.len(), 4);
        let g1: Vec<Message> =
            serde_json::from_str(&fs::read_to_string(dir.path().join("g1.json")).unwrap()).unwrap();
        assert_eq!(g1, [Message::new("m1")]);
        assert!(!dir.path().join("b1.json").exists());
        archived.assert_calls(0);
    }

    #[tokio::test]
    async fn export_single_group_skips_listing() {
        let server = MockServer::start_async().await;
        let exporter = signed_in_exporter(&server, options()).await;
        mock_single_page(&server, "b1", "m9");
        let dir = tempfile::tempdir().unwrap();

        let summary = exporter
            .export_messages(dir.path(), &MessageSelection::Group("b1".to_string()))
            .await
            .unwrap();

        assert_eq!(summary.written, [dir.path().join("b1.json")]);
        assert!(!dir.path().join("groups.json").exists());
    }

    #[tokio::test]
    async fn failing_group_is_skipped_without_fail_fast() {
        let server = MockServer::start_async().await;
        let opts = ExporterOptions {
            fail_fast: false,
            ..options()
        };
        let exporter = signed_in_exporter(&server, opts).await;
        server.mock(|when, then| {
            when.method(GET).path("/api/v3/groups/g1/messages");
            then.status(500).body("boom");
        });
        mock_single_page(&server, "t1", "m2");
        let dir = tempfile::tempdir().unwrap();

        let summary = exporter
            .export_messages(dir.path(), &MessageSelection::All)
            .await
            .unwrap();

        assert_eq!(summary.written, [dir.path().join("t1.json")]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].group_id, "g1");
    }

    #[tokio::test]
    async fn failing_group_aborts_with_fail_fast() {
        let server = MockServer::start_async().await;
        let exporter = signed_in_exporter(&server, options()).await;
        server.mock(|when, then| {
            when.method(GET).path("/api/v3/groups/g1/messages");
            then.status(500).body("boom");
        });
        let talk = mock_single_page(&server, "t1", "m2");
        let dir = tempfile::tempdir().unwrap();

        let err = exporter
            .export_messages(dir.path(), &MessageSelection::Includes(String::new()))
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::Http { .. }));
        talk.assert_calls(0);
    }

    #[tokio::test]
    async fn export_groups_writes_listing() {
        let server = MockServer::start_async().await;
        let exporter = signed_in_exporter(&server, options()).await;
        let dir = tempfile::tempdir().unwrap();

        let groups = exporter.export_groups(dir.path()).await.unwrap();

        assert_eq!(groups.len(), 4);
        let written = fs::read_to_string(dir.path().join(GROUPS_FILE)).unwrap();
        assert!(written.starts_with("[\n    {\n        \"code\": \"g1\""));
    }
}
