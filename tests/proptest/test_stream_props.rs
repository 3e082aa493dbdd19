//! Property-based tests for execution data streams

use proptest::prelude::*;
use termexec::stream::DataStream;

proptest! {
    #[test]
    fn test_every_consumer_sees_all_chunks(
        chunks in prop::collection::vec("\\PC{0,32}", 0..50),
        consumers in 1usize..5,
    ) {
        let outputs = tokio_test::block_on(async {
            let stream = DataStream::new();
            let sequences: Vec<_> = (0..consumers).map(|_| stream.produce_lazy_sequence()).collect();
            for chunk in &chunks {
                stream.emit(chunk.clone());
            }
            stream.close();

            let mut outputs = Vec::new();
            for sequence in sequences {
                outputs.push(sequence.read_to_string().await);
            }
            stream.flush().await;
            outputs
        });

        let expected: String = chunks.concat();
        for output in outputs {
            prop_assert_eq!(&output, &expected);
        }
    }

    #[test]
    fn test_late_consumer_sees_suffix(
        chunks in prop::collection::vec("[a-z]{1,8}", 1..30),
        split in 0usize..30,
    ) {
        let split = split.min(chunks.len());
        let late_output = tokio_test::block_on(async {
            let stream = DataStream::new();
            for chunk in &chunks[..split] {
                stream.emit(chunk.clone());
            }
            let late = stream.produce_lazy_sequence();
            for chunk in &chunks[split..] {
                stream.emit(chunk.clone());
            }
            stream.close();
            late.read_to_string().await
        });

        prop_assert_eq!(late_output, chunks[split..].concat());
    }

    #[test]
    fn test_stats_count_accepted_bytes(chunks in prop::collection::vec("[a-z]{0,16}", 0..40)) {
        let stream = DataStream::new();
        for chunk in &chunks {
            stream.emit(chunk.clone());
        }
        stream.close();
        stream.emit("late");

        let stats = stream.stats();
        prop_assert_eq!(stats.chunks_emitted, chunks.len() as u64);
        prop_assert_eq!(stats.bytes_emitted, chunks.iter().map(|c| c.len() as u64).sum::<u64>());
        prop_assert_eq!(stats.late_writes, 1);
    }
}
