//! Single-layer LSTM encoder for the baseline model.

use candle_core::{Result, Tensor};
use candle_nn::rnn::{lstm, LSTMConfig, LSTMState, LSTM, RNN};
use candle_nn::VarBuilder;

/// Everything produced by unrolling the LSTM over a batch of sequences.
#[derive(Debug, Clone)]
pub struct RnnOutputs {
    /// Zero state sized to the batch.
    pub initial_state: LSTMState,
    /// Hidden state at every step, `[B, T, hidden]`.
    pub outputs: Tensor,
    pub final_state: LSTMState,
}

/// Unrolls one LSTM layer over `[B, T, F]` input.
///
/// Only a single layer is supported: the VRNN likelihood reconstructs the
/// cell's own input, which stacking would change.
#[derive(Debug)]
pub struct LstmEncoder {
    lstm: LSTM,
    hidden_dim: usize,
}

impl LstmEncoder {
    /// Creates the LSTM weights under `vb.pp("lstm")`.
    pub fn new(in_dim: usize, hidden_dim: usize, vb: VarBuilder) -> Result<Self> {
        let lstm = lstm(in_dim, hidden_dim, LSTMConfig::default(), vb.pp("lstm"))?;
        Ok(Self { lstm, hidden_dim })
    }

    /// Unrolls from a zero state. Errors on an empty time dimension.
    pub fn forward(&self, x: &Tensor) -> Result<RnnOutputs> {
        let (batch, seq_len, _) = x.dims3()?;
        if seq_len == 0 {
            candle_core::bail!("LstmEncoder: empty sequence");
        }
        let initial_state = self.lstm.zero_state(batch)?;
        let states = self.lstm.seq_init(x, &initial_state)?;
        let outputs = self.lstm.states_to_tensor(&states)?;
        let final_state = match states.last() {
            Some(state) => state.clone(),
            None => candle_core::bail!("LstmEncoder: no states produced"),
        };
        Ok(RnnOutputs {
            initial_state,
            outputs,
            final_state,
        })
    }

    pub fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device, IndexOp};
    use candle_nn::VarMap;

    fn encoder(in_dim: usize, hidden: usize) -> (VarMap, LstmEncoder) {
        let var_map = VarMap::new();
        let vb = VarBuilder::from_varmap(&var_map, DType::F32, &Device::Cpu);
        let enc = LstmEncoder::new(in_dim, hidden, vb).unwrap();
        (var_map, enc)
    }

    #[test]
    fn output_shapes() {
        let (_vm, enc) = encoder(3, 16);
        let x = Tensor::randn(0f32, 1f32, (4, 9, 3), &Device::Cpu).unwrap();
        let out = enc.forward(&x).unwrap();
        assert_eq!(out.outputs.dims(), &[4, 9, 16]);
        assert_eq!(out.initial_state.h().dims(), &[4, 16]);
        assert_eq!(out.final_state.c().dims(), &[4, 16]);
        assert_eq!(enc.hidden_dim(), 16);
    }

    #[test]
    fn initial_state_is_zero() {
        let (_vm, enc) = encoder(2, 8);
        let x = Tensor::randn(0f32, 1f32, (3, 4, 2), &Device::Cpu).unwrap();
        let out = enc.forward(&x).unwrap();
        let total = out
            .initial_state
            .h()
            .abs()
            .unwrap()
            .sum_all()
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        assert_eq!(total, 0.0);
    }

    #[test]
    fn last_output_equals_final_hidden_state() {
        let (_vm, enc) = encoder(2, 8);
        let x = Tensor::randn(0f32, 1f32, (3, 5, 2), &Device::Cpu).unwrap();
        let out = enc.forward(&x).unwrap();
        let last = out.outputs.i((.., 4)).unwrap().to_vec2::<f32>().unwrap();
        let h = out.final_state.h().to_vec2::<f32>().unwrap();
        assert_eq!(last, h);
    }

    #[test]
    fn empty_sequence_errors() {
        let (_vm, enc) = encoder(2, 8);
        let x = Tensor::zeros((3, 0, 2), DType::F32, &Device::Cpu).unwrap();
        assert!(enc.forward(&x).is_err());
    }
}
