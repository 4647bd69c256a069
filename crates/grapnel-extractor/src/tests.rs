//! Integration tests for the extraction pipeline

#[cfg(test)]
mod tests {
    use crate::{ExtractConfig, ExtractError, Pipeline, ValidationLevel};
    use grapnel_domain::{
        document::write_jsonl, AlignmentStatus, AttributeValue, CharInterval, Document,
        ExampleRecord, Extraction,
    };
    use grapnel_llm::{MockProvider, SimpleSchemaAdapter};

    fn medication_example() -> ExampleRecord {
        ExampleRecord::new(
            "She was prescribed naproxen 250mg for the pain.",
            vec![Extraction::new("medication", "naproxen 250mg")
                .with_attribute("reason", AttributeValue::Str("pain".to_string()))],
        )
    }

    #[tokio::test]
    async fn test_exact_alignment_single_chunk() {
        let provider = MockProvider::new(
            r#"{"extractions":[{"medication":"aspirin 500mg","medication_attributes":{"frequency":"daily"}}]}"#,
        );
        let pipeline = Pipeline::new(
            provider,
            "Extract medications with their attributes.",
            vec![medication_example()],
            ExtractConfig::default(),
        )
        .unwrap();

        let documents = vec![Document::with_id("d1", "Patient takes aspirin 500mg daily.")];
        let annotated = pipeline.run(&documents).await.unwrap();

        assert_eq!(annotated.len(), 1);
        let extraction = &annotated[0].extractions[0];
        assert_eq!(extraction.class, "medication");
        assert_eq!(extraction.text, "aspirin 500mg");
        assert_eq!(extraction.char_interval, Some(CharInterval::new(14, 27)));
        assert_eq!(extraction.alignment_status, AlignmentStatus::Exact);
        assert_eq!(
            extraction.attributes.get("frequency"),
            Some(&AttributeValue::Str("daily".to_string()))
        );
    }

    #[tokio::test]
    async fn test_fuzzy_alignment_plural() {
        let provider = MockProvider::new(r#"[{"object":"chair"}]"#);
        let pipeline = Pipeline::new(
            provider,
            "Extract objects.",
            Vec::new(),
            ExtractConfig::default(),
        )
        .unwrap();

        let documents = vec![Document::with_id("d1", "The chairs were arranged.")];
        let annotated = pipeline.run(&documents).await.unwrap();

        let extraction = &annotated[0].extractions[0];
        assert_eq!(extraction.char_interval, Some(CharInterval::new(4, 10)));
        assert_eq!(extraction.alignment_status, AlignmentStatus::Fuzzy);
    }

    #[tokio::test]
    async fn test_lesser_alignment() {
        let provider = MockProvider::new(r#"[{"medication":"the drug ibuprofen"}]"#);
        let pipeline = Pipeline::new(
            provider,
            "Extract medications.",
            Vec::new(),
            ExtractConfig::default(),
        )
        .unwrap();

        let documents = vec![Document::with_id("d1", "He took ibuprofen.")];
        let annotated = pipeline.run(&documents).await.unwrap();

        let extraction = &annotated[0].extractions[0];
        assert_eq!(extraction.char_interval, Some(CharInterval::new(8, 17)));
        assert_eq!(extraction.alignment_status, AlignmentStatus::Lesser);
    }

    #[tokio::test]
    async fn test_unaligned_extraction() {
        let provider = MockProvider::new(r#"[{"entity":"completely unrelated phrase"}]"#);
        let pipeline = Pipeline::new(
            provider,
            "Extract entities.",
            Vec::new(),
            ExtractConfig::default(),
        )
        .unwrap();

        let documents = vec![Document::with_id("d1", "Hello world.")];
        let annotated = pipeline.run(&documents).await.unwrap();

        let extraction = &annotated[0].extractions[0];
        assert_eq!(extraction.alignment_status, AlignmentStatus::Unaligned);
        assert!(extraction.char_interval.is_none());
        assert!(extraction.token_interval.is_none());
    }

    #[tokio::test]
    async fn test_multi_pass_non_overlap_merge() {
        let provider = MockProvider::new("");
        provider.push_response(r#"{"extractions":[{"x":"alpha beta"}]}"#);
        provider.push_response(r#"{"extractions":[{"x":"beta"},{"x":"epsilon"}]}"#);

        let config = ExtractConfig {
            extraction_passes: 2,
            ..Default::default()
        };
        let pipeline = Pipeline::new(provider, "Extract.", Vec::new(), config).unwrap();

        let documents = vec![Document::with_id("d1", "alpha beta gamma delta epsilon")];
        let annotated = pipeline.run(&documents).await.unwrap();

        // Pass 2's "beta" overlaps pass 1's "alpha beta" (same class) and is
        // dropped; "epsilon" survives
        let texts: Vec<&str> = annotated[0]
            .extractions
            .iter()
            .map(|e| e.text.as_str())
            .collect();
        assert_eq!(texts, vec!["alpha beta", "epsilon"]);
    }

    #[tokio::test]
    async fn test_fence_and_reasoning_stripping() {
        let provider = MockProvider::new(
            "<think>let me think</think>\n```json\n{\"extractions\":[{\"x\":\"hello\"}]}\n```",
        );
        let pipeline =
            Pipeline::new(provider, "Extract.", Vec::new(), ExtractConfig::default()).unwrap();

        let documents = vec![Document::with_id("d1", "hello world")];
        let annotated = pipeline.run(&documents).await.unwrap();

        assert_eq!(annotated[0].extractions.len(), 1);
        assert_eq!(annotated[0].extractions[0].text, "hello");
        assert_eq!(
            annotated[0].extractions[0].alignment_status,
            AlignmentStatus::Exact
        );
    }

    #[tokio::test]
    async fn test_validation_error_aborts_before_inference() {
        let provider = MockProvider::new(r#"{"extractions":[]}"#);
        let observer = provider.clone();

        let bad_example = ExampleRecord::new(
            "Hello world.",
            vec![Extraction::new("entity", "zebra quark nimbus")],
        );
        let config = ExtractConfig {
            validation_level: ValidationLevel::Error,
            ..Default::default()
        };
        let pipeline = Pipeline::new(provider, "Extract.", vec![bad_example], config).unwrap();

        let documents = vec![Document::with_id("d1", "Some text.")];
        let result = pipeline.run(&documents).await;

        assert!(matches!(result, Err(ExtractError::AlignmentReport(_))));
        assert_eq!(observer.call_count(), 0);
    }

    #[tokio::test]
    async fn test_validation_warning_does_not_abort() {
        let provider = MockProvider::new(r#"{"extractions":[]}"#);
        let bad_example = ExampleRecord::new(
            "Hello world.",
            vec![Extraction::new("entity", "zebra quark nimbus")],
        );
        let pipeline = Pipeline::new(
            provider,
            "Extract.",
            vec![bad_example],
            ExtractConfig::default(),
        )
        .unwrap();

        let documents = vec![Document::with_id("d1", "Some text.")];
        assert!(pipeline.run(&documents).await.is_ok());
    }

    #[tokio::test]
    async fn test_empty_document_rejected() {
        let pipeline = Pipeline::new(
            MockProvider::default(),
            "Extract.",
            Vec::new(),
            ExtractConfig::default(),
        )
        .unwrap();

        let documents = vec![Document::with_id("d1", "   ")];
        let result = pipeline.run(&documents).await;
        assert!(matches!(result, Err(ExtractError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_duplicate_document_ids_rejected() {
        let pipeline = Pipeline::new(
            MockProvider::default(),
            "Extract.",
            Vec::new(),
            ExtractConfig::default(),
        )
        .unwrap();

        let documents = vec![
            Document::with_id("d1", "First."),
            Document::with_id("d1", "Second."),
        ];
        let result = pipeline.run(&documents).await;
        assert!(matches!(result, Err(ExtractError::InvalidInput(_))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ExtractConfig {
            extraction_passes: 0,
            ..Default::default()
        };
        let result = Pipeline::new(MockProvider::default(), "Extract.", Vec::new(), config);
        assert!(matches!(result, Err(ExtractError::InvalidInput(_))));
    }

    #[test]
    fn test_malformed_example_rejected() {
        let empty_text = ExampleRecord::new("  ", vec![Extraction::new("entity", "x")]);
        let result = Pipeline::new(
            MockProvider::default(),
            "Extract.",
            vec![empty_text],
            ExtractConfig::default(),
        );
        assert!(matches!(result, Err(ExtractError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_schema_adapter_round_trip() {
        let provider = MockProvider::new(r#"{"extractions":[{"medication":"naproxen 250mg"}]}"#);
        let pipeline = Pipeline::new(
            provider,
            "Extract medications.",
            vec![medication_example()],
            ExtractConfig::default(),
        )
        .unwrap()
        .with_schema(&SimpleSchemaAdapter::new())
        .unwrap();

        let documents = vec![Document::with_id("d1", "Given naproxen 250mg at night.")];
        let annotated = pipeline.run(&documents).await.unwrap();
        assert_eq!(
            annotated[0].extractions[0].alignment_status,
            AlignmentStatus::Exact
        );
    }

    #[test]
    fn test_schema_adapter_without_extractions_fails() {
        let no_extractions = ExampleRecord::new("Some text.", Vec::new());
        let result = Pipeline::new(
            MockProvider::default(),
            "Extract.",
            vec![no_extractions],
            ExtractConfig::default(),
        )
        .unwrap()
        .with_schema(&SimpleSchemaAdapter::new());
        assert!(matches!(result, Err(ExtractError::Schema(_))));
    }

    #[tokio::test]
    async fn test_jsonl_serialization() {
        let provider = MockProvider::new(r#"{"extractions":[{"word":"hello"}]}"#);
        let pipeline =
            Pipeline::new(provider, "Extract.", Vec::new(), ExtractConfig::default()).unwrap();

        let documents = vec![
            Document::with_id("d1", "hello world"),
            Document::with_id("d2", "hello again"),
        ];
        let annotated = pipeline.run(&documents).await.unwrap();
        let jsonl = write_jsonl(&annotated).unwrap();

        let lines: Vec<&str> = jsonl.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains(r#""alignment_status":"exact""#));
        assert!(lines[0].contains(r#""char_interval":{"start":0,"end":5}"#));
    }

    #[tokio::test]
    async fn test_batch_preserves_document_order() {
        let provider = MockProvider::new(r#"{"extractions":[]}"#);
        let pipeline =
            Pipeline::new(provider, "Extract.", Vec::new(), ExtractConfig::default()).unwrap();

        let documents: Vec<Document> = (0..5)
            .map(|i| Document::with_id(format!("doc-{}", i), format!("text number {}", i)))
            .collect();
        let annotated = pipeline.run(&documents).await.unwrap();

        let ids: Vec<&str> = annotated.iter().map(|a| a.document_id.as_str()).collect();
        assert_eq!(ids, vec!["doc-0", "doc-1", "doc-2", "doc-3", "doc-4"]);
    }

    #[tokio::test]
    async fn test_chunked_document_grounds_across_chunks() {
        // Force several chunks; the mock answers the same list everywhere,
        // and only the chunk containing each span grounds it
        let provider = MockProvider::new(
            r#"{"extractions":[{"word":"quick"},{"word":"lazy"}]}"#,
        );
        let config = ExtractConfig {
            max_char_buffer: 25,
            context_window_chars: 10,
            ..Default::default()
        };
        let pipeline = Pipeline::new(provider, "Extract.", Vec::new(), config).unwrap();

        let text = "The quick brown fox jumps over the lazy dog near the river bank.";
        let documents = vec![Document::with_id("d1", text)];
        let annotated = pipeline.run(&documents).await.unwrap();

        let aligned: Vec<&Extraction> = annotated[0]
            .extractions
            .iter()
            .filter(|e| e.is_aligned())
            .collect();
        let spans: Vec<&str> = aligned
            .iter()
            .map(|e| {
                let interval = e.char_interval.unwrap();
                &text[interval.start as usize..interval.end as usize]
            })
            .collect();
        assert!(spans.contains(&"quick"));
        assert!(spans.contains(&"lazy"));

        // Grounded intervals are in document order
        let starts: Vec<u32> = aligned
            .iter()
            .map(|e| e.char_interval.unwrap().start)
            .collect();
        let mut sorted = starts.clone();
        sorted.sort_unstable();
        assert_eq!(starts, sorted);
    }
}
