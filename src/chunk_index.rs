use tantivy::{
    Index,
    IndexWriter,
    TantivyDocument,
    collector::TopDocs,
    doc,
    query::{
        BooleanQuery,
        BoostQuery,
        FuzzyTermQuery,
        Occur,
        Query,
        QueryParser,
    },
    schema::*,
    tokenizer::{LowerCaser, RemoveLongFilter, SimpleTokenizer, TextAnalyzer},
};

use crate::{error::Result, store::DocumentChunk, text_util::fold_case};

/// Field names used in the schema.
pub mod fields {
    pub const ORDINAL: &str = "ordinal";
    pub const TITLE: &str = "title";
    pub const BODY: &str = "body";
}

/// Tokenizer shared by titles and bodies. No stemming: content is mixed
/// Serbian Cyrillic and Latin.
const TOKENIZER: &str = "folded";

const WRITER_MEMORY: usize = 15_000_000;

/// Query terms shorter than this are not expanded with fuzzy variants.
const MIN_FUZZY_TERM_CHARS: usize = 4;

/// Fuzzy hits score a constant; keep it below a typical exact BM25 hit.
const FUZZY_BOOST: f32 = 0.3;

/// A chunk matched by a query: its position in the indexed slice and its
/// BM25 score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkHit {
    pub index: usize,
    pub score: f32,
}

#[derive(Clone, Copy)]
struct SchemaFields {
    ordinal: Field,
    title: Field,
    body: Field,
}

/// A throwaway in-memory BM25 index over a set of candidate chunks.
pub struct ChunkIndex {
    index: Index,
    fields: SchemaFields,
    len: usize,
}

fn build_schema() -> (Schema, SchemaFields) {
    let mut builder = Schema::builder();

    let ordinal = builder.add_u64_field(fields::ORDINAL, STORED | FAST);

    let text_opts = TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer(TOKENIZER)
            .set_index_option(IndexRecordOption::WithFreqsAndPositions),
    );
    let title = builder.add_text_field(fields::TITLE, text_opts.clone());
    let body = builder.add_text_field(fields::BODY, text_opts);

    (
        builder.build(),
        SchemaFields {
            ordinal,
            title,
            body,
        },
    )
}

fn register_tokenizers(index: &Index) {
    let folded = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(40))
        .filter(LowerCaser)
        .build();
    index.tokenizers().register(TOKENIZER, folded);
}

impl ChunkIndex {
    /// Index `chunks` in RAM. Hits refer back to positions in this slice.
    pub fn build(chunks: &[DocumentChunk]) -> Result<Self> {
        let (schema, fields) = build_schema();
        let index = Index::create_in_ram(schema);
        register_tokenizers(&index);

        let mut writer: IndexWriter =
            index.writer_with_num_threads(1, WRITER_MEMORY)?;
        for (i, chunk) in chunks.iter().enumerate() {
            writer.add_document(doc!(
                fields.ordinal => i as u64,
                fields.title => chunk.title.as_str(),
                fields.body => chunk.content.as_str(),
            ))?;
        }
        writer.commit()?;

        Ok(Self {
            index,
            fields,
            len: chunks.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Rank chunks against `query_str` with BM25 plus distance-1 fuzzy
    /// matching on the body. The title field is boosted 2x.
    ///
    /// Results are ordered by score, then by position.
    pub fn search(&self, query_str: &str, limit: usize) -> Result<Vec<ChunkHit>> {
        if self.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let f = self.fields;
        let reader = self.index.reader()?;
        let searcher = reader.searcher();

        let mut parser =
            QueryParser::for_index(&self.index, vec![f.title, f.body]);
        parser.set_field_boost(f.title, 2.0);
        let (bm25_query, _errors) = parser.parse_query_lenient(query_str);

        let mut clauses: Vec<(Occur, Box<dyn Query>)> =
            vec![(Occur::Should, bm25_query)];
        for word in query_str.split_whitespace() {
            let term =
                fold_case(word.trim_matches(|c: char| !c.is_alphanumeric()));
            if term.chars().count() >= MIN_FUZZY_TERM_CHARS {
                let term = tantivy::Term::from_field_text(f.body, &term);
                let fuzzy = FuzzyTermQuery::new(term, 1, true);
                clauses.push((
                    Occur::Should,
                    Box::new(BoostQuery::new(Box::new(fuzzy), FUZZY_BOOST)),
                ));
            }
        }
        let query = BooleanQuery::new(clauses);

        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;
            if let Some(ordinal) =
                doc.get_first(f.ordinal).and_then(|v| v.as_u64())
            {
                hits.push(ChunkHit {
                    index: ordinal as usize,
                    score,
                });
            }
        }
        hits.sort_by(|a, b| {
            b.score.total_cmp(&a.score).then(a.index.cmp(&b.index))
        });

        Ok(hits)
    }
}

impl std::fmt::Debug for ChunkIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkIndex")
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}
