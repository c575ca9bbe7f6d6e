//! Catalog operations layered over [`CatalogStorage`]: library updates,
//! keyword search, module grouping, export and seeding.

use chrono::{DateTime, Utc};
use csv::{QuoteStyle, WriterBuilder};
use std::collections::BTreeMap;
use tracing::info;

use crate::db::CatalogStorage;
use crate::error::BridgeError;
use crate::types::dataserver::split_list;
use crate::types::{DataServerInfo, LibraryUpdateForm};

/// Filler removed from natural-language keyword queries.
const FILLER_WORDS: &[&str] = &["como", "um", "uma"];
const FILLER_PHRASE: &str = "no rm";

fn check_form(form: &LibraryUpdateForm) -> Result<(), BridgeError> {
    let mut errors: BTreeMap<String, Vec<String>> = BTreeMap::new();
    if form.name.trim().is_empty() {
        errors
            .entry("name".to_string())
            .or_default()
            .push("Name is required".to_string());
    }
    if form.routine.trim().is_empty() {
        errors
            .entry("routine".to_string())
            .or_default()
            .push("Routine is required".to_string());
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(BridgeError::FormInvalid(errors))
    }
}

/// Apply `form` to the stored row (if any), last write wins.
///
/// On update, empty list inputs and absent optional fields keep what is
/// stored. Documentation fields are only touched when the form asks for it.
pub fn merge_library_update(
    existing: Option<DataServerInfo>,
    form: &LibraryUpdateForm,
    author: &str,
    now: DateTime<Utc>,
) -> Result<DataServerInfo, BridgeError> {
    check_form(form)?;

    let is_new = existing.is_none();
    let mut ds = existing.unwrap_or_else(|| DataServerInfo {
        name: form.name.trim().to_string(),
        ..Default::default()
    });

    ds.routine = form.routine.trim().to_string();
    if let Some(description) = &form.description {
        ds.description = description.clone();
    }

    let keywords = split_list(&form.keywords);
    if is_new || !keywords.is_empty() {
        ds.keywords = keywords;
    }
    let primary_keys = split_list(&form.primary_keys);
    if is_new || !primary_keys.is_empty() {
        ds.primary_keys = primary_keys;
    }

    if let Some(example) = &form.get_example {
        ds.get_example = example.clone();
    }
    if let Some(example) = &form.post_example {
        ds.post_example = example.clone();
    }
    ds.requires_filter = !form.primary_keys.trim().is_empty();

    if form.want_to_add_documentation {
        ds.common_errors = form.common_errors.clone();
        ds.consumption_tips = form.consumption_tips.clone();
        ds.filter_tips = form.filter_tips.clone();
        ds.usage_examples = form.usage_examples.clone();
        ds.notes = form.notes.clone();
        ds.last_documentation_update = Some(now);
        ds.documentation_author = Some(author.to_string());
    }

    Ok(ds)
}

/// Validate, merge and persist a library-update form. Returns the stored row
/// and whether it was created.
pub async fn apply_library_update(
    storage: &CatalogStorage,
    form: &LibraryUpdateForm,
    author: &str,
) -> Result<(DataServerInfo, bool), BridgeError> {
    check_form(form)?;
    let existing = storage.get_by_name(form.name.trim()).await?;
    let created = existing.is_none();
    let mut ds = merge_library_update(existing, form, author, Utc::now())?;
    ds.id = storage.upsert(&ds).await?;
    info!(
        name = %ds.name,
        created,
        documented = form.want_to_add_documentation,
        "library entry saved"
    );
    Ok((ds, created))
}

/// Lower-cased search words with the filler phrase and filler words removed.
pub fn keyword_terms(term: &str) -> Vec<String> {
    let lowered = term.to_lowercase();
    let mut words: Vec<&str> = lowered.split_whitespace().collect();

    // drop the two-word phrase wherever it appears
    let phrase: Vec<&str> = FILLER_PHRASE.split(' ').collect();
    let mut i = 0;
    while i + phrase.len() <= words.len() {
        if words[i..i + phrase.len()] == phrase[..] {
            words.drain(i..i + phrase.len());
        } else {
            i += 1;
        }
    }

    words
        .into_iter()
        .filter(|w| !FILLER_WORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// Rows whose joined keyword list contains at least one term, ranked by the
/// number of terms hit (ties by name).
pub fn rank_by_keywords(rows: Vec<DataServerInfo>, terms: &[String]) -> Vec<DataServerInfo> {
    let mut scored: Vec<(usize, DataServerInfo)> = rows
        .into_iter()
        .filter_map(|ds| {
            let haystack = ds.keywords.join(",").to_lowercase();
            let hits = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
            (hits > 0).then_some((hits, ds))
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.name.cmp(&b.1.name)));
    scored.into_iter().map(|(_, ds)| ds).collect()
}

pub async fn search_by_keywords(
    storage: &CatalogStorage,
    term: &str,
) -> Result<Vec<DataServerInfo>, BridgeError> {
    let terms = keyword_terms(term);
    if terms.is_empty() {
        return Ok(Vec::new());
    }
    let rows = storage.list_all().await?;
    Ok(rank_by_keywords(rows, &terms))
}

/// Rows keyed by module prefix; each group stays sorted by name.
pub fn group_by_module(rows: Vec<DataServerInfo>) -> BTreeMap<String, Vec<DataServerInfo>> {
    let mut groups: BTreeMap<String, Vec<DataServerInfo>> = BTreeMap::new();
    for ds in rows {
        groups.entry(ds.group_key()).or_default().push(ds);
    }
    for group in groups.values_mut() {
        group.sort_by(|a, b| a.name.cmp(&b.name));
    }
    groups
}

/// Catalog as CSV, every field quoted, lists joined with `;`.
pub fn export_csv(rows: &[DataServerInfo]) -> Result<String, BridgeError> {
    let mut wtr = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_writer(Vec::new());
    wtr.write_record([
        "Id",
        "Name",
        "Routine",
        "Description",
        "PrimaryKeys",
        "Keywords",
    ])?;
    for ds in rows {
        wtr.write_record([
            ds.id.to_string(),
            ds.name.clone(),
            ds.routine.clone(),
            ds.description.clone(),
            ds.primary_keys.join(";"),
            ds.keywords.join(";"),
        ])?;
    }
    let bytes = wtr.into_inner().map_err(|e| e.into_error())?;
    String::from_utf8(bytes)
        .map_err(|e| BridgeError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

fn example_rows() -> Vec<DataServerInfo> {
    vec![
        DataServerInfo {
            name: "EduDataServer".to_string(),
            routine: "edu/getStudentInfo".to_string(),
            primary_keys: vec!["id".to_string(), "code".to_string()],
            description: "Busca informações do aluno".to_string(),
            get_example: r#"{ "id": 123, "code": "ABC" }"#.to_string(),
            post_example: r#"{ "name": "João", "age": 20 }"#.to_string(),
            requires_filter: true,
            keywords: vec!["aluno".into(), "estudante".into(), "educacional".into()],
            ..Default::default()
        },
        DataServerInfo {
            name: "HRDataServer".to_string(),
            routine: "hr/getEmployeeData".to_string(),
            primary_keys: vec!["employeeId".to_string()],
            description: "Busca dados do funcionário".to_string(),
            get_example: r#"{ "employeeId": 456 }"#.to_string(),
            post_example: r#"{ "name": "Maria", "department": "TI" }"#.to_string(),
            requires_filter: true,
            keywords: vec!["rh".into(), "funcionário".into(), "colaborador".into()],
            ..Default::default()
        },
    ]
}

/// Insert the two example rows when the catalog is empty.
pub async fn seed_examples(storage: &CatalogStorage) -> Result<usize, BridgeError> {
    if storage.count().await? > 0 {
        info!("catalog already populated, skipping seed");
        return Ok(0);
    }
    let ids = storage.upsert_many(&example_rows()).await?;
    info!(count = ids.len(), "seeded example DataServers");
    Ok(ids.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(name: &str, routine: &str) -> LibraryUpdateForm {
        LibraryUpdateForm {
            name: name.to_string(),
            routine: routine.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn missing_name_and_routine_are_reported_per_field() {
        let err = merge_library_update(None, &form(" ", ""), "ana", Utc::now()).unwrap_err();
        match err {
            BridgeError::FormInvalid(errors) => {
                assert!(errors.contains_key("name"));
                assert!(errors.contains_key("routine"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn update_keeps_lists_when_input_is_blank() {
        let mut stored = DataServerInfo::new("FopFuncData", "old");
        stored.keywords = vec!["folha".into()];
        stored.primary_keys = vec!["CHAPA".into()];
        stored.notes = Some("keep me".into());

        let mut f = form("FopFuncData", "new");
        f.keywords = "  ".into();
        let ds = merge_library_update(Some(stored), &f, "ana", Utc::now()).unwrap();
        assert_eq!(ds.routine, "new");
        assert_eq!(ds.keywords, vec!["folha"]);
        assert_eq!(ds.primary_keys, vec!["CHAPA"]);
        assert!(!ds.requires_filter);
        assert_eq!(ds.notes.as_deref(), Some("keep me"));
    }

    #[test]
    fn documentation_is_stamped_only_on_request() {
        let mut f = form("FopFuncData", "r");
        f.primary_keys = "CODCOLIGADA, CHAPA".into();
        f.notes = Some("n".into());
        let ds = merge_library_update(None, &f, "ana", Utc::now()).unwrap();
        assert_eq!(ds.notes, None);
        assert!(ds.requires_filter);
        assert_eq!(ds.primary_keys, vec!["CODCOLIGADA", "CHAPA"]);

        f.want_to_add_documentation = true;
        let ds = merge_library_update(None, &f, "ana", Utc::now()).unwrap();
        assert_eq!(ds.notes.as_deref(), Some("n"));
        assert_eq!(ds.documentation_author.as_deref(), Some("ana"));
        assert!(ds.last_documentation_update.is_some());
    }

    #[test]
    fn filler_words_are_removed_whole() {
        assert_eq!(
            keyword_terms("Como cadastrar um funcionário no RM"),
            vec!["cadastrar", "funcionário"]
        );
        // "umidade" must survive even though it starts with "um"
        assert_eq!(keyword_terms("umidade"), vec!["umidade"]);
    }

    #[test]
    fn keyword_hits_decide_the_order() {
        let mut a = DataServerInfo::new("AData", "r");
        a.keywords = vec!["folha".into()];
        let mut b = DataServerInfo::new("BData", "r");
        b.keywords = vec!["folha".into(), "pagamento".into()];
        let c = DataServerInfo::new("CData", "r");

        let ranked = rank_by_keywords(vec![a, b, c], &["folha".into(), "pagamento".into()]);
        let names: Vec<_> = ranked.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["BData", "AData"]);
    }

    #[test]
    fn groups_use_the_name_prefix() {
        let rows = vec![
            DataServerInfo::new("FopFuncData", "r"),
            DataServerInfo::new("finLanData", "r"),
            DataServerInfo::new("Fo", "r"),
            DataServerInfo::new("FopDependData", "r"),
        ];
        let groups = group_by_module(rows);
        assert_eq!(groups["FOP"][0].name, "FopDependData");
        assert_eq!(groups["FIN"].len(), 1);
        assert_eq!(groups["FO"].len(), 1);
    }

    #[test]
    fn csv_quotes_every_field() {
        let mut ds = DataServerInfo::new("FopFuncData", "r");
        ds.id = 7;
        ds.description = "say \"hi\"".into();
        ds.primary_keys = vec!["A".into(), "B".into()];
        let csv = export_csv(&[ds]).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            r#""Id","Name","Routine","Description","PrimaryKeys","Keywords""#
        );
        assert_eq!(
            lines.next().unwrap(),
            r#""7","FopFuncData","r","say ""hi""","A;B","""#
        );
    }

    #[test]
    fn csv_keeps_multiline_descriptions_in_one_record() {
        let mut ds = DataServerInfo::new("A\"B", "r");
        ds.description = "line1\nline2".into();
        let csv = export_csv(&[ds]).unwrap();
        assert!(csv.contains(r#""A""B""#));
        assert!(csv.contains("\"line1\nline2\""));

        let mut rdr = csv::Reader::from_reader(csv.as_bytes());
        let records: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(&records[0][1], "A\"B");
        assert_eq!(&records[0][3], "line1\nline2");
    }
}
