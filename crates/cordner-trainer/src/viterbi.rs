//! # Viterbi Decoding
//!
//! Finds the best-scoring tag sequence under BIO transition constraints.

use crate::tags::TagSet;

/// Viterbi decoder with hard BIO constraints.
#[derive(Debug, Clone)]
pub struct ViterbiDecoder {
    num_tags: usize,
    valid_transitions: Vec<Vec<bool>>,
    valid_starts: Vec<bool>,
}

impl ViterbiDecoder {
    /// Build a decoder for the tags in `tags`.
    pub fn new(tags: &TagSet) -> Self {
        Self {
            num_tags: tags.num_tags(),
            valid_transitions: tags.transition_mask(),
            valid_starts: tags.start_mask(),
        }
    }

    /// Decode the optimal tag sequence.
    ///
    /// # Arguments
    /// * `emission_scores` - `[seq_len][num_tags]` emission scores
    /// * `transition_matrix` - `[num_tags][num_tags]` transition scores, `[from][to]`
    ///
    /// # Returns
    /// The optimal tag sequence as indices. Forbidden transitions are never used.
    pub fn decode(
        &self,
        emission_scores: &[Vec<f32>],
        transition_matrix: &[Vec<f32>],
    ) -> Vec<usize> {
        let seq_len = emission_scores.len();
        if seq_len == 0 || self.num_tags == 0 {
            return Vec::new();
        }

        let mut dp: Vec<Vec<f32>> = vec![vec![f32::NEG_INFINITY; self.num_tags]; seq_len];
        let mut backptr: Vec<Vec<usize>> = vec![vec![0; self.num_tags]; seq_len];

        for tag in 0..self.num_tags {
            if self.valid_starts[tag] {
                dp[0][tag] = emission_scores[0][tag];
            }
        }

        for pos in 1..seq_len {
            for curr_tag in 0..self.num_tags {
                let mut best_score = f32::NEG_INFINITY;
                let mut best_prev = 0;

                for prev_tag in 0..self.num_tags {
                    if !self.valid_transitions[prev_tag][curr_tag] {
                        continue;
                    }

                    let score = dp[pos - 1][prev_tag] + transition_matrix[prev_tag][curr_tag];
                    if score > best_score {
                        best_score = score;
                        best_prev = prev_tag;
                    }
                }

                dp[pos][curr_tag] = best_score + emission_scores[pos][curr_tag];
                backptr[pos][curr_tag] = best_prev;
            }
        }

        // Ties resolve to the lowest index, so an untrained model predicts `O`.
        let mut best_final_tag = 0;
        let mut best_final_score = f32::NEG_INFINITY;
        for tag in 0..self.num_tags {
            if dp[seq_len - 1][tag] > best_final_score {
                best_final_score = dp[seq_len - 1][tag];
                best_final_tag = tag;
            }
        }

        let mut path = vec![best_final_tag];
        let mut curr_tag = best_final_tag;
        for pos in (1..seq_len).rev() {
            curr_tag = backptr[pos][curr_tag];
            path.push(curr_tag);
        }

        path.reverse();
        path
    }
}
