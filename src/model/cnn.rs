//! CNN Model Architecture
//!
//! A small sequential classifier:
//!
//! ```text
//! [B, 3, S, S]
//!   -> (Conv 3x3 valid + ReLU -> MaxPool 2x2) x 3   (32, 64, 128 filters)
//!   -> flatten
//!   -> Dense(128) + ReLU -> Dropout(0.5)
//!   -> Dense(1) for two classes, Dense(N) otherwise
//! ```
//!
//! `forward` returns logits. Two-class models have a single sigmoid unit and
//! are trained with binary cross-entropy; larger models use softmax with
//! categorical cross-entropy.

use std::fmt;

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, Relu,
    },
    tensor::{activation, backend::Backend, Int, Tensor},
};
use serde::{Deserialize, Serialize};

/// Configuration for the ImageClassifier CNN model
#[derive(Config, Debug, PartialEq)]
pub struct CnnConfig {
    /// Number of classes; 2 means a single sigmoid output unit
    #[config(default = "2")]
    pub num_classes: usize,

    /// Input image size (assumes square images)
    #[config(default = "128")]
    pub input_size: usize,

    /// Number of input channels (3 for RGB)
    #[config(default = "3")]
    pub in_channels: usize,

    /// Filters of the first stage, doubled at each following stage
    #[config(default = "32")]
    pub base_filters: usize,

    /// Width of the hidden dense layer
    #[config(default = "128")]
    pub dense_units: usize,

    /// Dropout rate for regularization
    #[config(default = "0.5")]
    pub dropout_rate: f64,
}

impl CnnConfig {
    pub const STAGES: usize = 3;
    const KERNEL: usize = 3;

    /// Whether the head is a single sigmoid unit
    pub fn is_binary(&self) -> bool {
        self.num_classes == 2
    }

    pub fn output_units(&self) -> usize {
        if self.is_binary() {
            1
        } else {
            self.num_classes
        }
    }

    /// Filter count of each stage
    pub fn stage_filters(&self) -> [usize; Self::STAGES] {
        [
            self.base_filters,
            self.base_filters * 2,
            self.base_filters * 4,
        ]
    }

    /// Spatial side after each stage's valid conv and 2x2 pool
    pub fn stage_sides(&self) -> [(usize, usize); Self::STAGES] {
        let mut side = self.input_size;
        let mut sides = [(0, 0); Self::STAGES];
        for entry in sides.iter_mut() {
            let conv = side.saturating_sub(Self::KERNEL - 1);
            side = conv / 2;
            *entry = (conv, side);
        }
        sides
    }

    /// Length of the flattened feature vector fed to the dense layer
    pub fn flatten_features(&self) -> usize {
        let side = self.stage_sides()[Self::STAGES - 1].1;
        self.stage_filters()[Self::STAGES - 1] * side * side
    }

    /// Check that the input survives three conv/pool stages
    pub fn validate(&self) -> Result<(), String> {
        if self.num_classes < 2 {
            return Err(format!("num_classes must be at least 2, got {}", self.num_classes));
        }
        if self.flatten_features() == 0 {
            return Err(format!(
                "input_size {} is too small for {} conv/pool stages",
                self.input_size,
                Self::STAGES
            ));
        }
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err(format!("dropout_rate must be in [0, 1), got {}", self.dropout_rate));
        }
        Ok(())
    }

    /// Layer table with output shapes and trainable parameter counts
    pub fn summary(&self) -> ModelSummary {
        let mut layers = Vec::new();
        let mut in_channels = self.in_channels;

        for (i, (filters, (conv_side, pool_side))) in self
            .stage_filters()
            .into_iter()
            .zip(self.stage_sides())
            .enumerate()
        {
            layers.push(LayerSummary {
                name: format!("conv2d_{}", i + 1),
                output_shape: vec![filters, conv_side, conv_side],
                params: (Self::KERNEL * Self::KERNEL * in_channels + 1) * filters,
            });
            layers.push(LayerSummary {
                name: format!("max_pooling2d_{}", i + 1),
                output_shape: vec![filters, pool_side, pool_side],
                params: 0,
            });
            in_channels = filters;
        }

        let flat = self.flatten_features();
        layers.push(LayerSummary {
            name: "flatten".into(),
            output_shape: vec![flat],
            params: 0,
        });
        layers.push(LayerSummary {
            name: "dense".into(),
            output_shape: vec![self.dense_units],
            params: (flat + 1) * self.dense_units,
        });
        layers.push(LayerSummary {
            name: "dropout".into(),
            output_shape: vec![self.dense_units],
            params: 0,
        });
        layers.push(LayerSummary {
            name: "dense_output".into(),
            output_shape: vec![self.output_units()],
            params: (self.dense_units + 1) * self.output_units(),
        });

        let total_params = layers.iter().map(|l| l.params).sum();
        ModelSummary {
            layers,
            total_params,
        }
    }
}

/// One row of the model summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSummary {
    pub name: String,
    /// Per-sample output shape (batch dimension omitted)
    pub output_shape: Vec<usize>,
    pub params: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub layers: Vec<LayerSummary>,
    pub total_params: usize,
}

impl fmt::Display for ModelSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<20} {:<22} {:>12}", "Layer", "Output Shape", "Param #")?;
        writeln!(f, "{}", "=".repeat(56))?;
        for layer in &self.layers {
            let dims: Vec<String> = layer.output_shape.iter().map(|d| d.to_string()).collect();
            let shape = format!("(None, {})", dims.join(", "));
            writeln!(f, "{:<20} {:<22} {:>12}", layer.name, shape, layer.params)?;
        }
        writeln!(f, "{}", "=".repeat(56))?;
        write!(f, "Total params: {}", self.total_params)
    }
}

/// Conv 3x3 (valid) + ReLU + MaxPool 2x2
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub relu: Relu,
    pub pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new(
            [in_channels, out_channels],
            [CnnConfig::KERNEL, CnnConfig::KERNEL],
        )
        .init(device);

        Self {
            conv,
            relu: Relu::new(),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.relu.forward(x);
        self.pool.forward(x)
    }
}

/// Image classifier CNN
#[derive(Module, Debug)]
pub struct ImageClassifier<B: Backend> {
    pub conv1: ConvBlock<B>,
    pub conv2: ConvBlock<B>,
    pub conv3: ConvBlock<B>,

    pub fc1: Linear<B>,
    pub dropout: Dropout,
    pub fc2: Linear<B>,

    num_classes: usize,
}

impl<B: Backend> ImageClassifier<B> {
    pub fn new(config: &CnnConfig, device: &B::Device) -> Self {
        let [f1, f2, f3] = config.stage_filters();

        let conv1 = ConvBlock::new(config.in_channels, f1, device);
        let conv2 = ConvBlock::new(f1, f2, device);
        let conv3 = ConvBlock::new(f2, f3, device);

        let fc1 = LinearConfig::new(config.flatten_features(), config.dense_units).init(device);
        let dropout = DropoutConfig::new(config.dropout_rate).init();
        let fc2 = LinearConfig::new(config.dense_units, config.output_units()).init(device);

        Self {
            conv1,
            conv2,
            conv3,
            fc1,
            dropout,
            fc2,
            num_classes: config.num_classes,
        }
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, 3, height, width]
    ///
    /// # Returns
    /// * Logits of shape [batch_size, 1] for two classes, [batch_size, num_classes] otherwise
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(x);
        let x = self.conv2.forward(x);
        let x = self.conv3.forward(x);

        // [B, C, H, W] -> [B, C*H*W]
        let x: Tensor<B, 2> = x.flatten(1, 3);

        let x = self.fc1.forward(x);
        let x = Relu::new().forward(x);
        let x = self.dropout.forward(x);
        self.fc2.forward(x)
    }

    /// Sigmoid (binary) or softmax (multi-class) probabilities
    pub fn forward_probabilities(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let logits = self.forward(x);
        if self.is_binary() {
            activation::sigmoid(logits)
        } else {
            activation::softmax(logits, 1)
        }
    }

    /// Predicted class index per sample, from logits
    pub fn predict(&self, logits: Tensor<B, 2>) -> Tensor<B, 1, Int> {
        let [batch_size, _] = logits.dims();
        if self.is_binary() {
            logits.greater_elem(0.0).int().reshape([batch_size])
        } else {
            logits.argmax(1).reshape([batch_size])
        }
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn is_binary(&self) -> bool {
        self.num_classes == 2
    }
}
